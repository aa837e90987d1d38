//! Console rendering for the client: gallows, board and final statistics

use crate::client::GuessedLetters;
use crate::mailbox::MAX_ERRORS;
use std::fmt::Write;

/// Ground line under every drawing
const BASE: &str = "|_____|";

fn gallows_rows(errors: u8) -> Vec<&'static str> {
    let errors = errors.min(MAX_ERRORS);
    let mut rows = Vec::new();

    if errors >= 4 {
        rows.push("   _______");
    }
    if errors >= 5 {
        rows.push(if errors >= 6 { "   |/    |" } else { "   |/" });
    }
    if errors >= 7 {
        rows.push("   |    (_)");
    }
    if errors >= 8 {
        rows.push("   |    \\|/");
        rows.push("   |     |");
    }
    if errors >= 9 {
        rows.push("   |    / \\");
    }

    let pole_height = match errors {
        0 | 1 => 0,
        2 => 2,
        3 => 8,
        // the drawn rows above replace part of the pole
        _ => 8usize.saturating_sub(rows.len().saturating_sub(1)),
    };
    for _ in 0..pole_height {
        rows.push("   |");
    }

    match errors {
        0 => {}
        1 => rows.push("|__ __|"),
        _ => rows.push("|__|__|"),
    }
    rows.push(BASE);
    rows
}

/// ASCII gallows for `errors` wrong guesses
pub fn gallows(errors: u8) -> String {
    let mut out = String::from("\n");
    for row in gallows_rows(errors) {
        out.push_str(row);
        out.push('\n');
    }
    out
}

/// Board shown after every response
pub fn board(masked_word: &str, errors: u8, guessed: &GuessedLetters) -> String {
    let mut out = gallows(errors);
    let _ = writeln!(out, "Secret Word: {}", masked_word);
    let _ = writeln!(out, "Error Counter: {}/{}", errors, MAX_ERRORS);
    if !guessed.is_empty() {
        out.push_str("Already used chars: |");
        for letter in guessed.iter() {
            let _ = write!(out, " {} |", letter);
        }
        out.push('\n');
    }
    out
}

/// Summary printed when the client leaves
pub fn summary(wins: u32, losses: u32, out_of_words: bool) -> String {
    let reason = if out_of_words {
        "There are no more words that you could conquer"
    } else {
        "You have chosen to stop the riddles"
    };
    format!(
        "\n{}, so here are your stats:\n\tWon Games:     {}\n\tLost Games:    {}\n\tRounds Played: {}\n",
        reason,
        wins,
        losses,
        wins + losses
    )
}
