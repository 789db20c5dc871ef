//! Breakpoint condition grammar: a single register comparison.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::registers::{CpuState, RegisterName, UnknownRegister};

/// Comparison operator of a condition expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Comparison {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
}

impl Comparison {
    /// Returns the operator's source form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
        }
    }
}

/// Rejection raised when condition text does not match the grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionParseError {
    /// The condition text was empty or whitespace.
    #[error("condition is empty")]
    Empty,
    /// Neither `==` nor `!=` was found.
    #[error("condition has no comparison operator")]
    MissingOperator,
    /// The left-hand side is not a known register name.
    #[error(transparent)]
    UnknownRegister(#[from] UnknownRegister),
    /// The right-hand side is not an unsigned 32-bit integer.
    #[error("invalid comparison value: {text}")]
    InvalidValue {
        /// The rejected right-hand-side text.
        text: String,
    },
}

/// Policy applied when an attached condition cannot be parsed.
///
/// Failing open favors not silently skipping a breakpoint the user believes
/// is active; failing closed suppresses breakpoints whose condition text is
/// malformed. Fail-open is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ConditionPolicy {
    /// An unparseable condition evaluates as always true.
    #[default]
    FailOpen,
    /// An unparseable condition evaluates as always false.
    FailClosed,
}

impl ConditionPolicy {
    /// Returns the evaluation outcome for a condition that did not parse.
    #[must_use]
    pub const fn unparseable_matches(self) -> bool {
        matches!(self, Self::FailOpen)
    }
}

/// A parsed condition: `REGISTER (== | !=) INTEGER`.
///
/// Integers are unsigned 32-bit, written in decimal or `0x`-prefixed
/// hexadecimal. Register names are case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Condition {
    /// Register read from the snapshot under test.
    pub register: RegisterName,
    /// Comparison operator.
    pub comparison: Comparison,
    /// Unsigned comparison value.
    pub value: u32,
}

impl Condition {
    /// Parses condition text against the grammar.
    ///
    /// Exposed so hosts that prefer rejecting malformed conditions at
    /// creation time can validate before calling
    /// [`crate::BreakpointTable::add`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConditionParseError`] describing the first grammar
    /// violation found.
    pub fn parse(text: &str) -> Result<Self, ConditionParseError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ConditionParseError::Empty);
        }
        let (register, comparison, value) = if let Some((lhs, rhs)) = trimmed.split_once("==") {
            (lhs, Comparison::Equal, rhs)
        } else if let Some((lhs, rhs)) = trimmed.split_once("!=") {
            (lhs, Comparison::NotEqual, rhs)
        } else {
            return Err(ConditionParseError::MissingOperator);
        };
        let register = RegisterName::from_str(register)?;
        let value = parse_unsigned(value.trim()).ok_or_else(|| {
            ConditionParseError::InvalidValue {
                text: value.trim().to_owned(),
            }
        })?;
        Ok(Self {
            register,
            comparison,
            value,
        })
    }

    /// Evaluates the condition against a register snapshot.
    #[must_use]
    pub const fn evaluate(&self, registers: &CpuState) -> bool {
        let actual = registers.register(self.register);
        match self.comparison {
            Comparison::Equal => actual == self.value,
            Comparison::NotEqual => actual != self.value,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {:#x}",
            self.register,
            self.comparison.as_str(),
            self.value
        )
    }
}

fn parse_unsigned(text: &str) -> Option<u32> {
    text.strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .map_or_else(|| text.parse().ok(), |hex| u32::from_str_radix(hex, 16).ok())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{Comparison, Condition, ConditionParseError, ConditionPolicy};
    use crate::registers::{CpuState, RegisterName};

    #[rstest]
    #[case("D0 == 0", RegisterName::D0, Comparison::Equal, 0)]
    #[case("d3==255", RegisterName::D3, Comparison::Equal, 255)]
    #[case("A7 != 0x00FF0000", RegisterName::A7, Comparison::NotEqual, 0x00FF_0000)]
    #[case("pc == 0X1000", RegisterName::Pc, Comparison::Equal, 0x1000)]
    #[case("  SR != 8967  ", RegisterName::Sr, Comparison::NotEqual, 8967)]
    #[case("usp == 4294967295", RegisterName::Usp, Comparison::Equal, u32::MAX)]
    fn grammar_accepts_register_comparisons(
        #[case] text: &str,
        #[case] register: RegisterName,
        #[case] comparison: Comparison,
        #[case] value: u32,
    ) {
        assert_eq!(
            Condition::parse(text),
            Ok(Condition {
                register,
                comparison,
                value
            })
        );
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("D0")]
    #[case("D0 = 5")]
    #[case("D0 < 5")]
    #[case("D9 == 5")]
    #[case("D0 == banana")]
    #[case("D0 == 4294967296")]
    #[case("D0 == -1")]
    #[case("D0 == 0xGG")]
    fn grammar_rejects_malformed_conditions(#[case] text: &str) {
        assert!(Condition::parse(text).is_err());
    }

    #[test]
    fn parse_errors_name_the_violation() {
        assert_eq!(Condition::parse("  "), Err(ConditionParseError::Empty));
        assert_eq!(
            Condition::parse("D0 <> 1"),
            Err(ConditionParseError::MissingOperator)
        );
        assert!(matches!(
            Condition::parse("Q4 == 1"),
            Err(ConditionParseError::UnknownRegister(_))
        ));
        assert!(matches!(
            Condition::parse("D0 == twelve"),
            Err(ConditionParseError::InvalidValue { .. })
        ));
    }

    #[test]
    fn evaluation_compares_the_named_register() {
        let mut registers = CpuState::default();
        registers.data[2] = 0x42;

        let equal = Condition::parse("D2 == 0x42").expect("valid condition");
        assert!(equal.evaluate(&registers));

        let not_equal = Condition::parse("D2 != 0x42").expect("valid condition");
        assert!(!not_equal.evaluate(&registers));

        registers.data[2] = 0x43;
        assert!(!equal.evaluate(&registers));
        assert!(not_equal.evaluate(&registers));
    }

    #[test]
    fn policy_controls_unparseable_outcomes() {
        assert!(ConditionPolicy::FailOpen.unparseable_matches());
        assert!(!ConditionPolicy::FailClosed.unparseable_matches());
        assert_eq!(ConditionPolicy::default(), ConditionPolicy::FailOpen);
    }

    #[test]
    fn display_round_trips_through_the_grammar() {
        let condition = Condition::parse("a3 != 48879").expect("valid condition");
        assert_eq!(condition.to_string(), "A3 != 0xbeef");
        assert_eq!(Condition::parse(&condition.to_string()), Ok(condition));
    }
}
