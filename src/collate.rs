//! String ordering for sorting report columns.
//!
//! Strings are first compared on their base letters: decomposed to NFD,
//! combining marks dropped and lowercased, so `"Ávila"` sorts with the `a`s.
//! Runs of ASCII digits in that key compare by numeric value so that `"2"`
//! sorts before `"10"`. Ties break on accents (unaccented first), then on case
//! (lowercase first) and finally bytewise, which keeps the ordering total.

use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;
use unicode_normalization::UnicodeNormalization as _;
use unicode_normalization::char::is_combining_mark;

pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    primary_cmp(&base_key(a), &base_key(b))
        .then_with(|| accent_key(a).cmp(&accent_key(b)))
        .then_with(|| case_cmp(a, b))
        .then_with(|| a.cmp(b))
}

/// `s` without accents and case, the key the primary comparison runs on.
pub fn base_key(s: &str) -> String {
    s.nfd()
        .flat_map(char::to_lowercase)
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

// Letters with their marks still attached, case folded.
fn accent_key(s: &str) -> String {
    s.nfd()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphabetic() || is_combining_mark(*c))
        .collect()
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(&c) = chars.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits
}

fn numeric_cmp(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn primary_cmp(a: &str, b: &str) -> Ordering {
    let mut ai = a.chars().peekable();
    let mut bi = b.chars().peekable();
    loop {
        match (ai.peek().copied(), bi.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let ord = numeric_cmp(&take_digits(&mut ai), &take_digits(&mut bi));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                ai.next();
                bi.next();
                let ord = x.cmp(&y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

// Compares the case of the letters only, so it stays a total order on its own.
fn case_cmp(a: &str, b: &str) -> Ordering {
    let upper = |s: &str| {
        s.chars()
            .filter(|c| c.is_alphabetic())
            .map(char::is_uppercase)
            .collect::<Vec<bool>>()
    };
    upper(a).cmp(&upper(b))
}
