//! Combat system - strength comparison with asymmetric upsets

use std::cmp::Ordering;

use super::board::Cell;

/// Side that won a fight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Victor {
    Attacker,
    Defender,
    Tie,
}

/// Pairs (weaker, stronger) where the weaker unit wins outright
const UPSETS: [(i32, i32); 2] = [(1, 5), (2, 4)];

/// Whether a unit of strength `weaker` beats `stronger` by upset
pub fn is_upset(weaker: i32, stronger: i32) -> bool {
    UPSETS.contains(&(weaker, stronger))
}

/// Decide a fight between two unit strengths.
///
/// Returns the victor and the strength the surviving unit keeps.
pub fn duel(attacker: i32, defender: i32) -> (Victor, i32) {
    if is_upset(attacker, defender) {
        return (Victor::Attacker, attacker);
    }
    if is_upset(defender, attacker) {
        return (Victor::Defender, defender);
    }
    match attacker.cmp(&defender) {
        Ordering::Greater => (Victor::Attacker, attacker - defender),
        Ordering::Less => (Victor::Defender, defender - attacker),
        Ordering::Equal => (Victor::Tie, 0),
    }
}

/// Apply a fight to the two involved cells.
///
/// The attacking unit always leaves its source cell. A winning attacker takes
/// over the defender's cell, a tie leaves the contested cell unowned.
pub fn resolve(attacker: &mut Cell, defender: &mut Cell) -> (Victor, i32) {
    let (victor, survivor) = duel(attacker.value, defender.value);

    attacker.value = 0;
    match victor {
        Victor::Attacker => {
            defender.owner = attacker.owner.clone();
            defender.value = survivor;
        }
        Victor::Defender => {
            defender.value = survivor;
        }
        Victor::Tie => {
            defender.owner = None;
            defender.value = 0;
        }
    }

    (victor, survivor)
}
