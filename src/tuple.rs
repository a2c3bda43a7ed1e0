//! Fixed-arity value carriers used by the combination operators.

/// Two co-occurring values, as produced by `combine`, `combine_latest` and
/// `pair`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Pair<A, B>(pub A, pub B);

/// Three co-occurring values, as produced by the three-way combinators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Triple<A, B, C>(pub A, pub B, pub C);

impl<A, B> Pair<A, B> {
  /// Extend with a third value.
  pub fn append<C>(self, third: C) -> Triple<A, B, C> { Triple(self.0, self.1, third) }

  /// Swap the two slots.
  pub fn swap(self) -> Pair<B, A> { Pair(self.1, self.0) }
}

impl<A, B> From<(A, B)> for Pair<A, B> {
  fn from((a, b): (A, B)) -> Self { Pair(a, b) }
}

impl<A, B, C> From<(A, B, C)> for Triple<A, B, C> {
  fn from((a, b, c): (A, B, C)) -> Self { Triple(a, b, c) }
}
