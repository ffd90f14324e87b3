//! Nicknames for presets that do not set one, and fallbacks when the server
//! reports the chosen one as taken.

use rand::RngExt;

/// Most networks still cap nicknames at 9 characters.
pub const MAX_NICK_LEN: usize = 9;

const PREFIXES: &[&str] = &[
    "Crab", "Reef", "Tide", "Kelp", "Shell", "Coral", "Wave", "Surf", "Salt", "Sand", "Pearl",
    "Drift", "Brine", "Shoal", "Pinch",
];

const SUFFIXES: &[&str] = &["Bot", "Link", "Hub", "Relay", "Node", "Bridge", "Net", "Pipe"];

/// A random nickname such as `ReefHub42`, at most [`MAX_NICK_LEN`] bytes.
pub fn generate_nickname() -> String {
    let mut rng = rand::rng();
    let prefix = PREFIXES[rng.random_range(0..PREFIXES.len())];
    let suffix = SUFFIXES[rng.random_range(0..SUFFIXES.len())];
    let num: u8 = rng.random_range(0..100);
    let mut nick = format!("{}{}", prefix, suffix);
    nick.truncate(MAX_NICK_LEN - 2);
    format!("{}{}", nick, num)
}

/// Next nickname to try after `nick` was rejected as in use: append `_`
/// while there is room, otherwise replace the tail with random digits.
pub fn alternate_nickname(nick: &str) -> String {
    if nick.len() < MAX_NICK_LEN {
        return format!("{}_", nick);
    }
    let mut rng = rand::rng();
    let num: u8 = rng.random_range(10..100);
    let mut base: String = nick.chars().take(MAX_NICK_LEN - 2).collect();
    base.push_str(&num.to_string());
    base
}
