//! Splits a requested question count into provider-sized batches.

/// One generation call's share of the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Batch {
  /// 1-based position, used to attribute diagnostics.
  pub number: usize,
  /// Number of questions already covered by earlier batches.
  pub offset: usize,
  pub size: usize,
}

/// Ordered batches summing to `count`, each in `1..=batch_size`.
/// A zero `batch_size` is treated as 1 so the plan is always total.
pub fn plan_batches(count: usize, batch_size: usize) -> Vec<Batch> {
  let batch_size = batch_size.max(1);
  (0..count)
    .step_by(batch_size)
    .enumerate()
    .map(|(i, offset)| Batch {
      number: i + 1,
      offset,
      size: batch_size.min(count - offset),
    })
    .collect()
}
