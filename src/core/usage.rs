//! Token usage accounting.
//!
//! [`Usage`] is a commutative monoid over `(prompt_tokens, completion_tokens)`
//! with saturating 64-bit arithmetic. [`UsageAccumulator`] is the shared
//! running total that concurrent chunk calls add into.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// Token counts reported by one or more capability calls.
///
/// # Examples
///
/// ```
/// use minions_rs::core::Usage;
///
/// let a = Usage::new(100, 20);
/// let b = Usage::new(5, 5);
/// assert_eq!(Usage::combine(a, b).total_tokens(), 130);
/// assert_eq!(a + Usage::zero(), a);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt.
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Tokens produced in the completion.
    #[serde(default)]
    pub completion_tokens: u64,
}

impl Usage {
    /// Creates a usage record.
    #[must_use]
    pub const fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    /// The identity element.
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0, 0)
    }

    /// Component-wise saturating sum.
    #[must_use]
    pub const fn combine(a: Self, b: Self) -> Self {
        Self {
            prompt_tokens: a.prompt_tokens.saturating_add(b.prompt_tokens),
            completion_tokens: a.completion_tokens.saturating_add(b.completion_tokens),
        }
    }

    /// Prompt plus completion tokens.
    #[must_use]
    pub const fn total_tokens(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }

    /// Returns `true` if no tokens were recorded.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.prompt_tokens == 0 && self.completion_tokens == 0
    }
}

impl Add for Usage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::combine(self, rhs)
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        *self = Self::combine(*self, rhs);
    }
}

impl Sum for Usage {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), Self::combine)
    }
}

impl<'a> Sum<&'a Self> for Usage {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// total_tokens is derived, so it is written out but never read back.
impl Serialize for Usage {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("Usage", 3)?;
        state.serialize_field("prompt_tokens", &self.prompt_tokens)?;
        state.serialize_field("completion_tokens", &self.completion_tokens)?;
        state.serialize_field("total_tokens", &self.total_tokens())?;
        state.end()
    }
}

/// Thread-safe running total of [`Usage`].
///
/// Cloning the `Arc` around an accumulator and calling [`add`](Self::add)
/// from concurrent tasks is the supported way to share it.
#[derive(Debug, Default)]
pub struct UsageAccumulator {
    total: Mutex<Usage>,
}

impl UsageAccumulator {
    /// Creates an accumulator starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one call's usage to the running total.
    pub fn add(&self, usage: Usage) {
        let mut total = self.total.lock();
        *total += usage;
    }

    /// Returns a snapshot of the running total.
    #[must_use]
    pub fn total(&self) -> Usage {
        *self.total.lock()
    }
}
