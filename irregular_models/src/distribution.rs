use std::collections::BTreeMap;

use rand::Rng;
use rand_distr::{Distribution as _, Exp, Normal};
use serde::{Deserialize, Serialize};

use crate::{duration::ReminderDuration, error::ValidationError};

/// Raw `dist_params` as they travel over the wire and into storage.
pub type DistributionParams = BTreeMap<String, String>;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionKind {
    #[default]
    Uniform,
    Normal,
    Exponential,
}

impl DistributionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistributionKind::Uniform => "uniform",
            DistributionKind::Normal => "normal",
            DistributionKind::Exponential => "exponential",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "uniform" => Some(DistributionKind::Uniform),
            "normal" => Some(DistributionKind::Normal),
            "exponential" => Some(DistributionKind::Exponential),
            _ => None,
        }
    }
}

/// How the offset from "now" to the next trigger is drawn.
///
/// Uniform draws inside the reminder's absolute window, so it carries no
/// parameters of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distribution {
    Uniform,
    Normal {
        mean: ReminderDuration,
        std: ReminderDuration,
    },
    Exponential {
        mean: ReminderDuration,
    },
}

impl Distribution {
    pub fn from_params(
        kind: DistributionKind,
        params: &DistributionParams,
    ) -> Result<Self, ValidationError> {
        let keys: Vec<&str> = params.keys().map(String::as_str).collect();

        match kind {
            DistributionKind::Uniform => {
                if !params.is_empty() {
                    return Err(ValidationError::new(
                        "dist_params",
                        "must be empty for the uniform distribution, use min_time/max_time instead",
                    ));
                }
                Ok(Distribution::Uniform)
            }
            DistributionKind::Normal => {
                if keys != ["mean", "std"] {
                    return Err(ValidationError::new(
                        "dist_params",
                        "the normal distribution takes exactly mean and std",
                    ));
                }
                Ok(Distribution::Normal {
                    mean: param(params, "mean")?,
                    std: param(params, "std")?,
                })
            }
            DistributionKind::Exponential => {
                if keys != ["mean"] {
                    return Err(ValidationError::new(
                        "dist_params",
                        "the exponential distribution takes exactly mean",
                    ));
                }
                let mean = param(params, "mean")?;
                if mean.num_seconds() == 0 {
                    return Err(ValidationError::new(
                        "dist_params",
                        "exponential mean must be positive",
                    ));
                }
                Ok(Distribution::Exponential { mean })
            }
        }
    }

    pub fn kind(&self) -> DistributionKind {
        match self {
            Distribution::Uniform => DistributionKind::Uniform,
            Distribution::Normal { .. } => DistributionKind::Normal,
            Distribution::Exponential { .. } => DistributionKind::Exponential,
        }
    }

    pub fn params(&self) -> DistributionParams {
        let mut params = DistributionParams::new();
        match self {
            Distribution::Uniform => {}
            Distribution::Normal { mean, std } => {
                params.insert("mean".to_owned(), mean.to_string());
                params.insert("std".to_owned(), std.to_string());
            }
            Distribution::Exponential { mean } => {
                params.insert("mean".to_owned(), mean.to_string());
            }
        }
        params
    }

    /// Draws an offset in seconds. `window` is the uniform range relative to
    /// now and is ignored by the other distributions.
    pub(crate) fn draw_offset<R: Rng + ?Sized>(&self, rng: &mut R, window: (f64, f64)) -> f64 {
        match self {
            Distribution::Uniform => {
                let (low, high) = window;
                if high <= low {
                    low
                } else {
                    rng.gen_range(low..=high)
                }
            }
            Distribution::Normal { mean, std } => {
                let mean = mean.as_secs_f64();
                match Normal::new(mean, std.as_secs_f64()) {
                    Ok(normal) => normal.sample(rng),
                    Err(_) => mean,
                }
            }
            Distribution::Exponential { mean } => {
                let mean = mean.as_secs_f64();
                match Exp::new(1.0 / mean) {
                    Ok(exp) => exp.sample(rng),
                    Err(_) => mean,
                }
            }
        }
    }
}

fn param(params: &DistributionParams, key: &'static str) -> Result<ReminderDuration, ValidationError> {
    let raw = params
        .get(key)
        .ok_or_else(|| ValidationError::new("dist_params", format!("missing {key}")))?;

    raw.parse()
        .map_err(|err| ValidationError::new("dist_params", format!("{key}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    fn params(pairs: &[(&str, &str)]) -> DistributionParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn uniform_rejects_explicit_params() {
        let err = Distribution::from_params(DistributionKind::Uniform, &params(&[("mean", "1h")]))
            .unwrap_err();
        assert_eq!(err.field, "dist_params");
        assert_eq!(
            Distribution::from_params(DistributionKind::Uniform, &params(&[])),
            Ok(Distribution::Uniform)
        );
    }

    #[test]
    fn normal_requires_exactly_mean_and_std() {
        assert!(Distribution::from_params(DistributionKind::Normal, &params(&[("mean", "1h")])).is_err());
        assert!(
            Distribution::from_params(
                DistributionKind::Normal,
                &params(&[("mean", "1h"), ("std", "5m"), ("rate", "1s")])
            )
            .is_err()
        );
        let normal = Distribution::from_params(
            DistributionKind::Normal,
            &params(&[("mean", "1h"), ("std", "5m")]),
        )
        .unwrap();
        assert_eq!(normal.kind(), DistributionKind::Normal);
        assert_eq!(normal.params(), params(&[("mean", "1h"), ("std", "5m")]));
    }

    #[test]
    fn exponential_requires_positive_mean() {
        assert!(Distribution::from_params(DistributionKind::Exponential, &params(&[])).is_err());
        assert!(
            Distribution::from_params(DistributionKind::Exponential, &params(&[("mean", "0s")]))
                .is_err()
        );
        assert!(
            Distribution::from_params(DistributionKind::Exponential, &params(&[("mean", "1 h x")]))
                .is_err()
        );
        assert!(
            Distribution::from_params(DistributionKind::Exponential, &params(&[("mean", "2h")]))
                .is_ok()
        );
    }

    #[test]
    fn uniform_draws_stay_inside_window() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            let offset = Distribution::Uniform.draw_offset(&mut rng, (1.0, 7.0));
            assert!((1.0..=7.0).contains(&offset));
        }
        assert_eq!(Distribution::Uniform.draw_offset(&mut rng, (3.0, 3.0)), 3.0);
    }

    #[test]
    fn exponential_draws_are_non_negative_with_roughly_the_right_mean() {
        let mut rng = StdRng::seed_from_u64(11);
        let exp = Distribution::Exponential {
            mean: ReminderDuration::from_seconds(100).unwrap(),
        };
        let draws: Vec<f64> = (0..20_000).map(|_| exp.draw_offset(&mut rng, (0.0, 0.0))).collect();
        assert!(draws.iter().all(|d| *d >= 0.0));
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        assert!((90.0..110.0).contains(&mean), "mean = {mean}");
    }

    #[test]
    fn kind_round_trips_through_its_name() {
        for kind in [
            DistributionKind::Uniform,
            DistributionKind::Normal,
            DistributionKind::Exponential,
        ] {
            assert_eq!(DistributionKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(DistributionKind::parse("NORMAL"), Some(DistributionKind::Normal));
        assert_eq!(DistributionKind::parse("poisson"), None);
    }
}
