use crate::model::*;

use super::conflict::within_window;

/// Live status of `table` given any set of reservations. Reservations for
/// other tables and inactive ones are ignored.
pub fn effective_status(table: &Table, reservations: &[Reservation]) -> EffectiveStatus {
    derive(table, reservations, None)
}

/// Same rule, restricted to reservations within the conflict window of `at`.
pub fn effective_status_at(table: &Table, reservations: &[Reservation], at: Ms) -> EffectiveStatus {
    derive(table, reservations, Some(at))
}

fn derive(table: &Table, reservations: &[Reservation], at: Option<Ms>) -> EffectiveStatus {
    if !table.is_active {
        return EffectiveStatus::Inactive;
    }
    let active: Vec<&Reservation> = reservations
        .iter()
        .filter(|r| r.table_number == table.table_number && r.status.is_active())
        .filter(|r| at.is_none_or(|t| within_window(r.reservation_time, t)))
        .collect();

    if active.len() > 1 {
        report_double_booking(table.table_number, &active);
    }

    match authoritative(&active).map(|r| r.status) {
        Some(ReservationStatus::CheckedIn) => EffectiveStatus::Occupied,
        Some(_) => EffectiveStatus::Reserved,
        None => EffectiveStatus::Available,
    }
}

/// A checked-in reservation wins unless a later-created one clashes with it
/// inside the conflict window. Otherwise the most recently created wins.
pub fn authoritative<'a>(active: &[&'a Reservation]) -> Option<&'a Reservation> {
    let newest = active.iter().copied().max_by_key(|r| (r.created_at, r.id))?;
    let seated = active.iter().copied().find(|r| {
        r.status == ReservationStatus::CheckedIn
            && !active.iter().any(|o| {
                (o.created_at, o.id) > (r.created_at, r.id) && within_window(o.reservation_time, r.reservation_time)
            })
    });
    Some(seated.unwrap_or(newest))
}

fn report_double_booking(table_number: u32, active: &[&Reservation]) {
    let mut times: Vec<&Reservation> = active.to_vec();
    times.sort_by_key(|r| r.reservation_time);
    for pair in times.windows(2) {
        if within_window(pair[0].reservation_time, pair[1].reservation_time) {
            tracing::warn!(
                table_number,
                first = %pair[0].id,
                second = %pair[1].id,
                "double booking: active reservations within the conflict window"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    const H: Ms = 3_600_000;
    const T0: Ms = 1_800_000_000_000;

    fn table(number: u32) -> Table {
        Table {
            id: Ulid::new(),
            table_number: number,
            capacity: 4,
            location: TableLocation::Main,
            status: TableStatus::Available,
            features: vec![],
            is_active: true,
        }
    }

    fn res(table_number: u32, at: Ms, status: ReservationStatus, created_at: Ms) -> Reservation {
        Reservation {
            id: Ulid::new(),
            table_number,
            client_name: "Guest".into(),
            client_phone: "555".into(),
            guest_count: 2,
            reservation_time: at,
            check_in_time: None,
            check_out_time: None,
            status,
            notes: None,
            reminder_sent: false,
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn inactive_wins_over_reservations() {
        let mut t = table(1);
        t.is_active = false;
        let rs = vec![res(1, T0, ReservationStatus::CheckedIn, 0)];
        assert_eq!(effective_status(&t, &rs), EffectiveStatus::Inactive);
    }

    #[test]
    fn no_active_reservations_is_available() {
        let t = table(1);
        let rs = vec![
            res(1, T0, ReservationStatus::Cancelled, 0),
            res(1, T0, ReservationStatus::CheckedOut, 1),
            res(2, T0, ReservationStatus::Reserved, 2),
        ];
        assert_eq!(effective_status(&t, &rs), EffectiveStatus::Available);
    }

    #[test]
    fn reserved_and_checked_in() {
        let t = table(1);
        assert_eq!(
            effective_status(&t, &[res(1, T0, ReservationStatus::Reserved, 0)]),
            EffectiveStatus::Reserved
        );
        assert_eq!(
            effective_status(&t, &[res(1, T0, ReservationStatus::CheckedIn, 0)]),
            EffectiveStatus::Occupied
        );
    }

    #[test]
    fn checked_in_is_authoritative_over_newer_reserved() {
        let t = table(1);
        let rs = vec![
            res(1, T0, ReservationStatus::CheckedIn, 10),
            res(1, T0 + 5 * H, ReservationStatus::Reserved, 20),
        ];
        assert_eq!(effective_status(&t, &rs), EffectiveStatus::Occupied);
    }

    #[test]
    fn newer_clashing_reservation_beats_checked_in() {
        let t = table(1);
        let seated = res(1, T0, ReservationStatus::CheckedIn, 10);
        let clash = res(1, T0 + H, ReservationStatus::Reserved, 20);
        let active = vec![&seated, &clash];
        assert_eq!(authoritative(&active).map(|r| r.id), Some(clash.id));
        assert_eq!(
            effective_status(&t, &[seated.clone(), clash.clone()]),
            EffectiveStatus::Reserved
        );

        // An older clashing booking does not unseat the party.
        let older = res(1, T0 - H, ReservationStatus::Reserved, 5);
        assert_eq!(authoritative(&[&older, &seated]).map(|r| r.id), Some(seated.id));
    }

    #[test]
    fn most_recent_reserved_is_authoritative() {
        let old = res(1, T0, ReservationStatus::Reserved, 10);
        let new = res(1, T0 + 5 * H, ReservationStatus::Reserved, 20);
        let active = vec![&old, &new];
        assert_eq!(authoritative(&active).map(|r| r.id), Some(new.id));
    }

    #[test]
    fn status_at_only_sees_the_window() {
        let t = table(1);
        let rs = vec![res(1, T0, ReservationStatus::CheckedIn, 0)];
        assert_eq!(effective_status_at(&t, &rs, T0 + 2 * H), EffectiveStatus::Occupied);
        assert_eq!(effective_status_at(&t, &rs, T0 - 2 * H), EffectiveStatus::Occupied);
        assert_eq!(effective_status_at(&t, &rs, T0 + 2 * H + 1), EffectiveStatus::Available);
        assert_eq!(effective_status_at(&t, &rs, T0 + 6 * H), EffectiveStatus::Available);
    }
}
