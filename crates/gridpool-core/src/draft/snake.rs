// Snake-order arithmetic shared by pick advancement and the on-deck projection.
//
// Seats are 1-based positions in the draft order. The direction reverses
// every `num_participants` picks, so a 4-seat draft runs 1 2 3 4 4 3 2 1 1 2 ...

/// Draft progress between two picks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnakeCursor {
    pub current_pick_index: usize,
    pub total_picks: usize,
}

impl SnakeCursor {
    /// Cursor of a freshly reset draft.
    pub fn start() -> Self {
        SnakeCursor {
            current_pick_index: 1,
            total_picks: 0,
        }
    }

    /// Count one pick and move to the seat that picks next.
    ///
    /// Even rounds walk forward and odd rounds walk backward. The clamps keep
    /// the seat in `1..=num_participants` for the pick that ends a round, so
    /// the last seat of a round also opens the next one. Returns `None` when
    /// there are no participants.
    pub fn advance(self, num_participants: usize) -> Option<Self> {
        if num_participants == 0 {
            return None;
        }

        let total_picks = self.total_picks + 1;
        let round = (total_picks - 1) / num_participants;
        let current_pick_index = if round.is_multiple_of(2) {
            (self.current_pick_index + 1).min(num_participants)
        } else {
            self.current_pick_index.saturating_sub(1).max(1)
        };

        Some(SnakeCursor {
            current_pick_index,
            total_picks,
        })
    }
}

/// Seat that makes the pick following `picks_made` earlier picks.
pub fn seat_for_pick(picks_made: usize, num_participants: usize) -> Option<usize> {
    if num_participants == 0 {
        return None;
    }
    let round = picks_made / num_participants;
    let index_in_round = picks_made % num_participants;
    Some(if round.is_multiple_of(2) {
        index_in_round + 1
    } else {
        num_participants - index_in_round
    })
}

/// Participants picking after the current one, without touching stored state.
///
/// `order` is the draft order sorted by position and `total_picks_so_far`
/// the number of picks already made (the current picker is making pick
/// `total_picks_so_far`, 0-based). Stops after `lookahead` names or once the
/// projected pick would reach `max_picks`.
pub fn on_deck(
    order: &[String],
    total_picks_so_far: usize,
    lookahead: usize,
    max_picks: usize,
) -> Vec<String> {
    // Skip the current picker.
    (total_picks_so_far + 1..max_picks)
        .take(lookahead)
        .filter_map(|pick| seat_for_pick(pick, order.len()))
        .map(|seat| order[seat - 1].clone())
        .collect()
}
