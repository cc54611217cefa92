//! Search space definitions and parameter proposal strategies.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use st_types::{validation_error, ParameterValue, ParameterVector, StResult};

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Parameter name including its routing prefix (e.g. "mdl_C").
    pub name: String,
    /// The kind of search range.
    pub kind: ParameterKind,
}

/// Describes how a parameter is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Continuous uniform range [low, high].
    FloatRange { low: f64, high: f64 },
    /// Integer range [low, high] inclusive.
    IntRange { low: i64, high: i64 },
    /// Log-uniform range (sampled in log-space then exponentiated).
    LogUniform { low: f64, high: f64 },
    /// Categorical choices.
    Choice { values: Vec<serde_json::Value> },
}

/// The full search space: an ordered list of parameter definitions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    pub fn add_float(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::FloatRange { low, high },
        });
        self
    }

    pub fn add_int(mut self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::IntRange { low, high },
        });
        self
    }

    pub fn add_log_uniform(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::LogUniform { low, high },
        });
        self
    }

    pub fn add_choice(mut self, name: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::Choice { values },
        });
        self
    }

    /// Reject ranges that cannot be sampled.
    pub fn validate(&self) -> StResult<()> {
        for param in &self.parameters {
            let ok = match &param.kind {
                ParameterKind::FloatRange { low, high } => low.is_finite() && high.is_finite() && low <= high,
                ParameterKind::IntRange { low, high } => low <= high,
                ParameterKind::LogUniform { low, high } => *low > 0.0 && low <= high && high.is_finite(),
                ParameterKind::Choice { values } => !values.is_empty(),
            };
            if !ok {
                return Err(validation_error!(
                    "parameter {} has an empty or invalid range: {:?}",
                    param.name,
                    param.kind
                ));
            }
        }
        Ok(())
    }

    fn sample_param(param: &ParameterDef, rng: &mut StdRng) -> ParameterValue {
        match &param.kind {
            ParameterKind::FloatRange { low, high } => {
                ParameterValue::Float(rng.random_range(*low..=*high))
            }
            ParameterKind::IntRange { low, high } => {
                ParameterValue::Int(rng.random_range(*low..=*high))
            }
            ParameterKind::LogUniform { low, high } => {
                let log_val: f64 = rng.random_range(low.ln()..=high.ln());
                ParameterValue::Float(log_val.exp())
            }
            ParameterKind::Choice { values } => {
                let idx = rng.random_range(0..values.len());
                ParameterValue::Json(values[idx].clone())
            }
        }
    }

    /// Draw one independent point from the space.
    pub fn sample(&self, rng: &mut StdRng) -> ParameterVector {
        self.parameters
            .iter()
            .map(|param| (param.name.clone(), Self::sample_param(param, rng)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Search strategies
// ---------------------------------------------------------------------------

/// Common trait for all search strategies.
///
/// The driver hands in the random source for every proposal, so a strategy
/// rebuilt from the same history proposes the same points.
pub trait SearchStrategy: Send + Sync {
    /// Propose the next parameter vector to evaluate.
    fn suggest(&mut self, rng: &mut StdRng) -> ParameterVector;

    /// Report a completed evaluation so adaptive strategies can learn.
    fn report(&mut self, _params: &ParameterVector, _loss: f64) {}

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

/// Build a strategy by name: "random" or "bayesian".
pub fn strategy_from_name(
    name: &str,
    space: SearchSpace,
    exploration_weight: f64,
) -> StResult<Box<dyn SearchStrategy>> {
    space.validate()?;
    match name {
        "random" => Ok(Box::new(RandomSearch::new(space))),
        "bayesian" => Ok(Box::new(BayesianSearch::new(space, exploration_weight))),
        other => Err(validation_error!("unknown search strategy: {other}")),
    }
}

// ---- Random search ----

/// Independent random sampling across the search space.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: SearchSpace,
}

impl RandomSearch {
    pub fn new(space: SearchSpace) -> Self {
        Self { space }
    }
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self, rng: &mut StdRng) -> ParameterVector {
        self.space.sample(rng)
    }

    fn name(&self) -> &str {
        "random"
    }
}

// ---- Bayesian search (surrogate-model stub) ----

/// Sequential model-based search that minimizes the reported loss.
///
/// Tracks observed (params, loss) pairs and biases future sampling toward the
/// best observed point: with probability `exploration_weight` a fresh random
/// point is drawn, otherwise the best point is perturbed. A proper surrogate
/// (GP, TPE) can replace this behind the same trait.
#[derive(Debug, Clone)]
pub struct BayesianSearch {
    space: SearchSpace,
    observations: Vec<(ParameterVector, f64)>,
    exploration_weight: f64,
}

impl BayesianSearch {
    pub fn new(space: SearchSpace, exploration_weight: f64) -> Self {
        Self {
            space,
            observations: Vec::new(),
            exploration_weight,
        }
    }

    /// Earliest observation with the lowest finite loss.
    fn best(&self) -> Option<&ParameterVector> {
        self.observations
            .iter()
            .filter(|(_, loss)| loss.is_finite())
            .fold(None::<&(ParameterVector, f64)>, |best, obs| match best {
                Some(b) if b.1 <= obs.1 => Some(b),
                _ => Some(obs),
            })
            .map(|(params, _)| params)
    }

    /// Exploitation: perturb the best-known point.
    fn exploit(&self, rng: &mut StdRng) -> ParameterVector {
        let Some(base) = self.best() else {
            return self.space.sample(rng);
        };

        let mut perturbed = ParameterVector::new();
        for param in &self.space.parameters {
            let value = match (&param.kind, base.get(&param.name)) {
                (ParameterKind::FloatRange { low, high }, Some(ParameterValue::Float(v))) => {
                    let noise = rng.random_range(-0.1..0.1) * (high - low);
                    ParameterValue::Float((v + noise).clamp(*low, *high))
                }
                (ParameterKind::IntRange { low, high }, Some(ParameterValue::Int(v))) => {
                    let delta: i64 = rng.random_range(-2..=2);
                    ParameterValue::Int((v + delta).clamp(*low, *high))
                }
                (ParameterKind::LogUniform { low, high }, Some(ParameterValue::Float(v))) => {
                    let log_range = high.ln() - low.ln();
                    let noise = rng.random_range(-0.1..0.1) * log_range;
                    ParameterValue::Float((v.ln() + noise).exp().clamp(*low, *high))
                }
                // Keep the incumbent category most of the time.
                (ParameterKind::Choice { .. }, Some(current)) if rng.random::<f64>() < 0.8 => {
                    current.clone()
                }
                _ => SearchSpace::sample_param(param, rng),
            };
            perturbed.insert(param.name.clone(), value);
        }
        perturbed
    }
}

impl SearchStrategy for BayesianSearch {
    fn suggest(&mut self, rng: &mut StdRng) -> ParameterVector {
        if self.observations.is_empty() || rng.random::<f64>() < self.exploration_weight {
            self.space.sample(rng)
        } else {
            self.exploit(rng)
        }
    }

    fn report(&mut self, params: &ParameterVector, loss: f64) {
        self.observations.push((params.clone(), loss));
    }

    fn name(&self) -> &str {
        "bayesian"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn sample_space() -> SearchSpace {
        SearchSpace::new()
            .add_log_uniform("mdl_C", 0.01, 100.0)
            .add_choice(
                "mdl_kernel",
                vec![
                    serde_json::json!("poly"),
                    serde_json::json!("rbf"),
                    serde_json::json!("sigmoid"),
                    serde_json::json!("linear"),
                ],
            )
            .add_float("bal_a", 0.1, 10.0)
            .add_int("bal_b", 1, 5)
    }

    #[test]
    fn random_search_respects_bounds() {
        let mut rs = RandomSearch::new(sample_space());
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..50 {
            let params = rs.suggest(&mut rng);
            match params.get("mdl_C") {
                Some(ParameterValue::Float(v)) => assert!(*v >= 0.01 && *v <= 100.0, "C out of bounds: {v}"),
                other => panic!("unexpected mdl_C value: {other:?}"),
            }
            match params.get("bal_b") {
                Some(ParameterValue::Int(v)) => assert!(*v >= 1 && *v <= 5),
                other => panic!("unexpected bal_b value: {other:?}"),
            }
            match params.get("mdl_kernel") {
                Some(ParameterValue::Json(v)) => {
                    let s = v.as_str().unwrap();
                    assert!(["poly", "rbf", "sigmoid", "linear"].contains(&s));
                }
                other => panic!("unexpected mdl_kernel value: {other:?}"),
            }
        }
    }

    #[test]
    fn same_seed_same_proposals() {
        let mut a = RandomSearch::new(sample_space());
        let mut b = RandomSearch::new(sample_space());
        let first = a.suggest(&mut StdRng::seed_from_u64(42));
        let second = b.suggest(&mut StdRng::seed_from_u64(42));
        assert_eq!(first, second);
    }

    #[test]
    fn bayesian_search_starts_with_exploration() {
        let mut bs = BayesianSearch::new(sample_space(), 0.3);
        let mut rng = StdRng::seed_from_u64(1);
        let params = bs.suggest(&mut rng);
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn bayesian_search_exploits_lowest_loss() {
        let space = SearchSpace::new().add_float("x", 0.0, 1.0);
        let mut bs = BayesianSearch::new(space, 0.0);

        let mut good = ParameterVector::new();
        good.insert("x".to_string(), ParameterValue::Float(0.2));
        let mut bad = ParameterVector::new();
        bad.insert("x".to_string(), ParameterValue::Float(0.9));
        bs.report(&bad, 0.8);
        bs.report(&good, 0.1);

        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            match bs.suggest(&mut rng).get("x") {
                Some(ParameterValue::Float(v)) => assert!((v - 0.2).abs() <= 0.1 + 1e-12),
                other => panic!("unexpected x value: {other:?}"),
            }
        }
    }

    #[test]
    fn bayesian_best_keeps_earliest_tie() {
        let space = SearchSpace::new().add_int("n", 0, 100);
        let mut bs = BayesianSearch::new(space, 0.0);
        for n in [10, 50] {
            let mut p = ParameterVector::new();
            p.insert("n".to_string(), ParameterValue::Int(n));
            bs.report(&p, 0.5);
        }
        assert_eq!(bs.best().unwrap().get("n"), Some(&ParameterValue::Int(10)));
    }

    #[test]
    fn strategy_from_name_validates() {
        assert_eq!(strategy_from_name("random", sample_space(), 0.3).unwrap().name(), "random");
        assert_eq!(strategy_from_name("bayesian", sample_space(), 0.3).unwrap().name(), "bayesian");
        assert!(strategy_from_name("tpe", sample_space(), 0.3).is_err());

        let empty_choice = SearchSpace::new().add_choice("mdl_kernel", vec![]);
        assert!(strategy_from_name("random", empty_choice, 0.3).is_err());
    }

    #[test]
    fn search_space_serializes() {
        let space = sample_space();
        let json = serde_json::to_string(&space).unwrap();
        let back: SearchSpace = serde_json::from_str(&json).unwrap();
        assert_eq!(back, space);
    }
}
