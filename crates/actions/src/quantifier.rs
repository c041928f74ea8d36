//! Selection quantifiers: the enablement algebra.

use std::fmt;

/// How many of the selected objects must offer a capability for an action to
/// be enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Quantifier {
	/// Exactly one capability instance, and at most one selected object.
	ExactlyOne,
	/// At least one capability instance.
	#[default]
	Any,
	/// One instance per selected object, every selected object capable.
	Each,
	/// At least one instance per selected object, every selected object capable.
	///
	/// Differs from [`Quantifier::Each`] only in the size check (`>=` instead
	/// of `==`), which tolerates coalesced instances.
	All,
}

impl Quantifier {
	/// Returns true if evaluation needs the selected population.
	pub const fn needs_population(self) -> bool {
		!matches!(self, Self::Any)
	}

	/// Evaluates the quantifier.
	///
	/// `matched` is the number of distinct capability instances; `population`
	/// the selected objects; `capable` reports whether one of them offers the
	/// capability.
	pub fn evaluate<N>(self, matched: usize, population: &[N], capable: impl Fn(&N) -> bool) -> bool {
		match self {
			Self::ExactlyOne => matched == 1 && population.len() <= 1,
			Self::Any => matched >= 1,
			Self::Each => matched > 0 && matched == population.len() && population.iter().all(capable),
			Self::All => matched > 0 && matched >= population.len() && population.iter().all(capable),
		}
	}
}

impl fmt::Display for Quantifier {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::ExactlyOne => "EXACTLY_ONE",
			Self::Any => "ANY",
			Self::Each => "EACH",
			Self::All => "ALL",
		})
	}
}
