//! Hangman rules
//!
//! Pure game-state transitions; no I/O and no knowledge of sessions or IPC.

use crate::dictionary::Dictionary;
use crate::mailbox::{MAX_ERRORS, PLACEHOLDER};

/// The dictionary has no word left for this session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoGamesLeft;

/// Result of a single guess
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    RoundContinues,
    Won,
    Lost,
}

/// One game in progress (or just finished)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameState {
    secret: Vec<u8>,
    masked: Vec<u8>,
    error_count: u8,
}

/// Start the game for a session that has already played `games_played` games
///
/// Letters are masked, every other character is shown as is.
pub fn start_game(dictionary: &Dictionary, games_played: usize) -> Result<GameState, NoGamesLeft> {
    let secret = dictionary.get(games_played).ok_or(NoGamesLeft)?;
    Ok(GameState::new(secret))
}

impl GameState {
    /// Fresh game for `secret`
    pub fn new(secret: &str) -> Self {
        let secret: Vec<u8> = secret.bytes().map(|b| b.to_ascii_uppercase()).collect();
        let masked = secret
            .iter()
            .map(|&b| if b.is_ascii_alphabetic() { PLACEHOLDER } else { b })
            .collect();

        Self {
            secret,
            masked,
            error_count: 0,
        }
    }

    /// Reveal every occurrence of `letter`, or count an error if there is none
    ///
    /// Repeating a letter is not filtered here: a repeated miss is a second error.
    pub fn apply_guess(&mut self, letter: u8) -> Outcome {
        let letter = letter.to_ascii_uppercase();
        let mut hit = false;

        if letter.is_ascii_alphabetic() {
            for (masked, &secret) in self.masked.iter_mut().zip(&self.secret) {
                if secret == letter {
                    *masked = secret;
                    hit = true;
                }
            }
        }

        if !hit {
            self.error_count = self.error_count.saturating_add(1);
        }

        self.outcome()
    }

    /// Outcome of the game as it stands
    pub fn outcome(&self) -> Outcome {
        if !self.masked.contains(&PLACEHOLDER) {
            Outcome::Won
        } else if self.error_count >= MAX_ERRORS {
            Outcome::Lost
        } else {
            Outcome::RoundContinues
        }
    }

    pub fn masked_word(&self) -> String {
        String::from_utf8_lossy(&self.masked).into_owned()
    }

    pub fn secret_word(&self) -> String {
        String::from_utf8_lossy(&self.secret).into_owned()
    }

    #[inline]
    pub fn error_count(&self) -> u8 {
        self.error_count
    }
}
