//! Adversarial and pixel-distance losses.
//!
//! The discriminator emits sigmoid probabilities, so both objectives are
//! plain binary cross-entropy over the patch score map, clamped away from
//! 0 and 1 for numerical stability.

use std::fmt;
use std::str::FromStr;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

const EPS: f64 = 1e-7;

/// Pixel-distance term added to the generator objective.
///
/// `None` leaves the adversarial term alone; it is valid but converges less
/// reliably early in training, when the adversarial signal is uninformative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceLoss {
    None,
    L1,
    L2,
}

impl FromStr for DistanceLoss {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "None" => Ok(Self::None),
            "L1" | "l1" => Ok(Self::L1),
            "L2" | "l2" => Ok(Self::L2),
            other => anyhow::bail!(
                "unknown distance loss {other:?} (expected \"none\", \"L1\" or \"L2\")"
            ),
        }
    }
}

impl fmt::Display for DistanceLoss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::L1 => write!(f, "L1"),
            Self::L2 => write!(f, "L2"),
        }
    }
}

/// Mean binary cross-entropy of a sigmoid score map against an all-real or
/// all-fake label.
pub fn adversarial_loss<B: Backend>(scores: Tensor<B, 4>, target_real: bool) -> Tensor<B, 1> {
    let p = scores.clamp(EPS, 1.0 - EPS);
    let nll = if target_real {
        p.log().neg()
    } else {
        (p.neg() + 1.0).log().neg()
    };
    nll.mean()
}

/// Weighted pixel-distance term, absent for [`DistanceLoss::None`].
pub fn distance_term<B: Backend>(
    kind: DistanceLoss,
    generated: Tensor<B, 4>,
    target: Tensor<B, 4>,
    weight: f64,
) -> Option<Tensor<B, 1>> {
    match kind {
        DistanceLoss::None => None,
        DistanceLoss::L1 => Some((generated - target).abs().mean() * weight),
        DistanceLoss::L2 => Some((generated - target).powf_scalar(2.0).mean() * weight),
    }
}

/// Discriminator objective: real pairs toward "real", generated pairs toward
/// "fake".
pub fn discriminator_loss<B: Backend>(
    d_real: Tensor<B, 4>,
    d_fake: Tensor<B, 4>,
) -> Tensor<B, 1> {
    adversarial_loss(d_real, true) + adversarial_loss(d_fake, false)
}

/// Generator objective: fool the discriminator, plus the optional weighted
/// distance to the target image.
pub fn generator_loss<B: Backend>(
    d_fake: Tensor<B, 4>,
    kind: DistanceLoss,
    generated: Tensor<B, 4>,
    target: Tensor<B, 4>,
    weight: f64,
) -> Tensor<B, 1> {
    let adversarial = adversarial_loss(d_fake, true);
    match distance_term(kind, generated, target, weight) {
        Some(distance) => adversarial + distance,
        None => adversarial,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;

    fn map(values: [[f32; 2]; 2]) -> Tensor<TestBackend, 4> {
        let device = Default::default();
        Tensor::<TestBackend, 2>::from_data(TensorData::from(values), &device)
            .reshape([1, 1, 2, 2])
    }

    #[test]
    fn test_confident_correct_scores_give_near_zero_loss() {
        let real = map([[0.999, 0.999], [0.999, 0.999]]);
        let loss: f32 = adversarial_loss(real, true).into_scalar().elem();
        assert!(loss < 0.01, "confident real scores should be near zero, got {loss}");

        let fake = map([[0.001, 0.001], [0.001, 0.001]]);
        let loss: f32 = adversarial_loss(fake, false).into_scalar().elem();
        assert!(loss < 0.01, "confident fake scores should be near zero, got {loss}");
    }

    #[test]
    fn test_wrong_scores_give_large_loss() {
        let fooled = map([[0.001, 0.001], [0.001, 0.001]]);
        let loss: f32 = adversarial_loss(fooled, true).into_scalar().elem();
        assert!(loss > 2.0, "confidently wrong scores should be penalized, got {loss}");
    }

    #[test]
    fn test_uncertain_scores_give_ln2() {
        let half = map([[0.5, 0.5], [0.5, 0.5]]);
        let loss: f32 = adversarial_loss(half, true).into_scalar().elem();
        let expected = 2.0_f32.ln();
        assert!((loss - expected).abs() < 1e-4, "expected ln(2), got {loss}");
    }

    #[test]
    fn test_distance_term_values() {
        let generated = map([[1.0, 1.0], [1.0, 1.0]]);
        let target = map([[0.0, 0.0], [0.0, 0.0]]);

        assert!(distance_term(DistanceLoss::None, generated.clone(), target.clone(), 100.0)
            .is_none());

        let l1: f32 = distance_term(DistanceLoss::L1, generated.clone(), target.clone(), 100.0)
            .unwrap()
            .into_scalar()
            .elem();
        assert!((l1 - 100.0).abs() < 1e-4, "mean-abs 1.0 x weight 100, got {l1}");

        let generated2 = map([[2.0, 2.0], [2.0, 2.0]]);
        let l2: f32 = distance_term(DistanceLoss::L2, generated2, target, 100.0)
            .unwrap()
            .into_scalar()
            .elem();
        assert!((l2 - 400.0).abs() < 1e-3, "mean-sq 4.0 x weight 100, got {l2}");
    }

    #[test]
    fn test_generator_loss_composition() {
        let d_fake = map([[0.5, 0.5], [0.5, 0.5]]);
        let generated = map([[1.0, 1.0], [1.0, 1.0]]);
        let target = map([[0.0, 0.0], [0.0, 0.0]]);

        let adversarial_only: f32 = generator_loss(
            d_fake.clone(),
            DistanceLoss::None,
            generated.clone(),
            target.clone(),
            100.0,
        )
        .into_scalar()
        .elem();
        let bare: f32 = adversarial_loss(d_fake.clone(), true).into_scalar().elem();
        assert!((adversarial_only - bare).abs() < 1e-6);

        let with_l1: f32 = generator_loss(d_fake, DistanceLoss::L1, generated, target, 100.0)
            .into_scalar()
            .elem();
        assert!(
            (with_l1 - (bare + 100.0)).abs() < 1e-3,
            "expected adversarial + 100, got {with_l1}"
        );
    }

    #[test]
    fn test_distance_loss_from_str() {
        assert_eq!("none".parse::<DistanceLoss>().unwrap(), DistanceLoss::None);
        assert_eq!("L1".parse::<DistanceLoss>().unwrap(), DistanceLoss::L1);
        assert_eq!("l2".parse::<DistanceLoss>().unwrap(), DistanceLoss::L2);
        let err = "huber".parse::<DistanceLoss>().unwrap_err().to_string();
        assert!(err.contains("huber"), "error should name the bad selector: {err}");
    }
}
