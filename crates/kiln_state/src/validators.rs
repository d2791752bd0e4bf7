//! Stock validators
//!
//! Each constructor returns a closure usable with
//! [`StateOptions::validator`](crate::StateOptions::validator). A validator
//! returns `Ok(())` for acceptable values and `Err(message)` otherwise; the
//! message ends up verbatim in [`StateError::Validation`](crate::StateError).
//!
//! ```rust
//! use kiln_core::Game;
//! use kiln_state::{validators, with_local_state, StateOptions};
//!
//! let game = Game::new();
//! let scene = game.create_scene("options");
//! let volume = with_local_state(
//!     &scene,
//!     "volume",
//!     Some(0.8f32),
//!     StateOptions::new().validator(validators::range(0.0, 1.0)),
//! )
//! .unwrap();
//!
//! assert!(volume.set(1.5).is_err());
//! ```

use std::fmt::{Debug, Display};

/// Result of a validation
pub type Validation = Result<(), String>;

/// Accept values within `min..=max`
///
/// Values that do not compare to themselves (NaN) are rejected.
pub fn range<N>(min: N, max: N) -> impl Fn(&N) -> Validation
where
    N: PartialOrd + Display + 'static,
{
    move |value: &N| {
        if value.partial_cmp(value).is_none() {
            return Err("Value must be a number".to_string());
        }
        if *value < min || *value > max {
            return Err(format!("Value must be between {min} and {max}"));
        }
        Ok(())
    }
}

/// Accept strings with at least one non-whitespace character
pub fn non_empty() -> impl Fn(&String) -> Validation {
    |value: &String| {
        if value.trim().is_empty() {
            Err("Value must not be empty".to_string())
        } else {
            Ok(())
        }
    }
}

/// Accept vectors whose length is within `min..=max`
pub fn length_between<U>(min: usize, max: usize) -> impl Fn(&Vec<U>) -> Validation {
    move |value: &Vec<U>| {
        let len = value.len();
        if len < min || len > max {
            Err(format!(
                "Array length must be between {min} and {max}, got {len}"
            ))
        } else {
            Ok(())
        }
    }
}

/// Accept only the listed values
pub fn one_of<T>(allowed: impl IntoIterator<Item = T>) -> impl Fn(&T) -> Validation
where
    T: PartialEq + Debug + 'static,
{
    let allowed: Vec<T> = allowed.into_iter().collect();
    move |value: &T| {
        if allowed.contains(value) {
            Ok(())
        } else {
            Err(format!("Value must be one of: {allowed:?}"))
        }
    }
}
