// src/balance.rs
use chrono::{NaiveDate, TimeDelta};

use crate::model::{LeaveKind, User};
use crate::store::TrackerStore;

/// Signed hours balance for a user as of `cutoff` (inclusive).
///
/// Worked time and leave count as credit, declared capacity as debit.
/// Compensatory rest stays out of the leave sum: it repays overtime the
/// balance already carries. All sums are zero when no records match.
pub fn balance_as_of(store: &TrackerStore, user: &User, cutoff: NaiveDate) -> TimeDelta {
    let worked = store
        .activities_for(user.id)
        .iter()
        .filter(|a| a.date <= cutoff)
        .fold(TimeDelta::zero(), |acc, a| acc + a.duration);
    let leave = store
        .leaves_for(user.id)
        .iter()
        .filter(|l| l.date <= cutoff && l.kind != LeaveKind::CompensatoryRest)
        .fold(TimeDelta::zero(), |acc, l| acc + l.duration);
    let capacity = store
        .capacities_for(user.id)
        .iter()
        .filter(|c| c.date <= cutoff)
        .fold(TimeDelta::zero(), |acc, c| acc + c.duration);

    user.start_balance + worked + leave - capacity
}

/// Cutoff used by the availability report: the day before the schedule
/// starts. Clamped at the calendar floor rather than failing.
pub fn day_before(date: NaiveDate) -> NaiveDate {
    date.pred_opt().unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Activity, Capacity, Leave, Location, Project};
    use uuid::Uuid;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn user_with_balance(store: &TrackerStore, minutes: i64) -> User {
        store.add_user(User {
            id: Uuid::new_v4(),
            username: "ada".to_string(),
            email: "ada@example.com".to_string(),
            start_balance: TimeDelta::minutes(minutes),
        })
    }

    fn add_capacity(store: &TrackerStore, user: &User, day: u32, hours: i64) {
        store
            .add_capacity(Capacity {
                id: Uuid::new_v4(),
                user: user.id,
                date: date(day),
                duration: TimeDelta::hours(hours),
            })
            .unwrap();
    }

    fn add_leave(store: &TrackerStore, user: &User, day: u32, kind: LeaveKind, hours: i64) {
        store
            .add_leave(Leave {
                id: Uuid::new_v4(),
                user: user.id,
                kind,
                date: date(day),
                duration: TimeDelta::hours(hours),
            })
            .unwrap();
    }

    #[test]
    fn empty_records_return_the_start_balance() {
        let store = TrackerStore::new();
        let user = user_with_balance(&store, 90);
        assert_eq!(
            balance_as_of(&store, &user, date(15)),
            TimeDelta::minutes(90)
        );
    }

    #[test]
    fn lone_capacity_before_cutoff_reads_minus_seven_hours() {
        let store = TrackerStore::new();
        let user = user_with_balance(&store, 0);
        add_capacity(&store, &user, 4, 7);

        assert_eq!(
            balance_as_of(&store, &user, date(10)),
            TimeDelta::hours(-7)
        );
    }

    #[test]
    fn worked_time_and_leave_offset_capacity() {
        let store = TrackerStore::new();
        let user = user_with_balance(&store, 0);
        let location = store.add_location(Location {
            id: Uuid::new_v4(),
            title: "Office".to_string(),
            comment: None,
        });
        let project = store
            .add_project(Project {
                id: Uuid::new_v4(),
                parent: None,
                title: "Engine".to_string(),
                comment: None,
            })
            .unwrap();

        add_capacity(&store, &user, 4, 7);
        add_capacity(&store, &user, 5, 7);
        store
            .add_activity(Activity {
                id: Uuid::new_v4(),
                user: user.id,
                project: project.id,
                date: date(4),
                duration: TimeDelta::hours(8),
                progression: None,
                location: location.id,
                is_teleworking: false,
                is_business_trip: false,
                comment: None,
            })
            .unwrap();
        add_leave(&store, &user, 5, LeaveKind::SickLeave, 7);

        // 8h worked + 7h sick leave - 14h capacity = +1h.
        assert_eq!(balance_as_of(&store, &user, date(10)), TimeDelta::hours(1));
    }

    #[test]
    fn compensatory_rest_is_not_credited() {
        let store = TrackerStore::new();
        let user = user_with_balance(&store, 0);
        add_capacity(&store, &user, 4, 7);
        add_leave(&store, &user, 4, LeaveKind::CompensatoryRest, 7);

        // The rest day does not cancel the capacity debit.
        assert_eq!(balance_as_of(&store, &user, date(10)), TimeDelta::hours(-7));

        // Any other kind would have.
        add_leave(&store, &user, 5, LeaveKind::PaidLeave, 7);
        assert_eq!(balance_as_of(&store, &user, date(10)), TimeDelta::zero());
    }

    #[test]
    fn records_after_the_cutoff_are_ignored() {
        let store = TrackerStore::new();
        let user = user_with_balance(&store, 0);
        add_capacity(&store, &user, 4, 7);
        add_capacity(&store, &user, 20, 7);

        assert_eq!(balance_as_of(&store, &user, date(10)), TimeDelta::hours(-7));
        // On the cutoff day itself the record still counts.
        assert_eq!(balance_as_of(&store, &user, date(4)), TimeDelta::hours(-7));
        assert_eq!(balance_as_of(&store, &user, date(3)), TimeDelta::zero());
    }

    #[test]
    fn day_before_clamps_at_the_calendar_floor() {
        assert_eq!(day_before(date(10)), date(9));
        assert_eq!(day_before(NaiveDate::MIN), NaiveDate::MIN);
    }
}
