//! Lossy quality negotiation against a size budget.

use crate::encode::estimated_payload_size;
use crate::error::RenderResult;
use serde::{Deserialize, Serialize};

/// How quality walks down while the output is over budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityPolicy {
    pub step: u8,
    pub floor: u8,
    pub max_iterations: u32,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self {
            step: 5,
            floor: 10,
            max_iterations: 20,
        }
    }
}

/// Outcome of a negotiation: the last encoding plus how it was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    pub bytes: Vec<u8>,
    pub quality: u8,
    pub estimated_size: usize,
    /// Every quality tried, in order.
    pub attempts: Vec<u8>,
    pub met_target: bool,
}

/// Encode at `initial` quality, then lower it by `policy.step` until the
/// estimated size fits `target`, the floor is reached or iterations run out.
///
/// Without a target the first encoding is returned as is. When the budget
/// cannot be met the last (lowest quality) encoding is still returned.
pub fn negotiate_quality<F>(
    initial: u8,
    target: Option<usize>,
    policy: &QualityPolicy,
    mut encode: F,
) -> RenderResult<Negotiated>
where
    F: FnMut(u8) -> RenderResult<Vec<u8>>,
{
    let step = policy.step.max(1);
    let max_iterations = policy.max_iterations.max(1);
    let mut quality = initial.clamp(1, 100);
    let mut attempts = Vec::new();

    loop {
        let bytes = encode(quality)?;
        attempts.push(quality);
        let estimated_size = estimated_payload_size(&bytes);
        let met_target = target.is_none_or(|t| estimated_size <= t);

        let exhausted = quality <= policy.floor || attempts.len() as u32 >= max_iterations;
        if met_target || exhausted {
            if !met_target {
                log::warn!(
                    "Size target not met: {estimated_size} bytes at quality {quality} after {} attempts",
                    attempts.len()
                );
            }
            return Ok(Negotiated {
                bytes,
                quality,
                estimated_size,
                attempts,
                met_target,
            });
        }

        quality = quality.saturating_sub(step).max(policy.floor);
        log::debug!("{estimated_size} bytes over budget, retrying at quality {quality}");
    }
}
