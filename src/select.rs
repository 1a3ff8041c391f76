//! Picks the operation for each worker iteration. No I/O happens here: the
//! result is an owned [`PreparedCall`] that the executor only reads.

use rand::Rng;
use rand::seq::SliceRandom;
use serde_json::Value;

use crate::catalog::{Catalog, LOGIN_SCENARIOS};
use crate::metrics::Aggregator;
use crate::models::{EndpointDescriptor, LoginScenario};

/// A fully decided call, body included
#[derive(Debug, Clone)]
pub struct PreparedCall<'a> {
    pub endpoint: &'a EndpointDescriptor,
    pub scenario: Option<LoginScenario>,
    pub body: Option<Value>,
}

impl PreparedCall<'_> {
    pub fn is_login(&self) -> bool {
        self.endpoint.login
    }
}

/// Bernoulli draw with probability `login_percentage / 100`.
pub fn is_login_call<R: Rng + ?Sized>(rng: &mut R, login_percentage: u8) -> bool {
    rng.gen_bool(f64::from(login_percentage.min(100)) / 100.0)
}

/// Uniform draw over the fixed scenario set.
pub fn draw_scenario<R: Rng + ?Sized>(rng: &mut R) -> LoginScenario {
    LOGIN_SCENARIOS
        .choose(rng)
        .copied()
        .unwrap_or(LOGIN_SCENARIOS[0])
}

/// Selects the target of one call and builds its body.
///
/// Login calls draw a scenario and count it in the aggregator immediately, so
/// scenario counts include calls that later fail in transit. Returns `None`
/// only when the catalog lacks the kind of endpoint asked for, which config
/// validation rules out before a run starts.
pub fn select_call<'a, R: Rng>(
    catalog: &'a Catalog,
    login: bool,
    rng: &mut R,
    aggregator: &Aggregator,
) -> Option<PreparedCall<'a>> {
    if login {
        let endpoint = catalog.login_endpoint()?;
        let scenario = draw_scenario(rng);
        aggregator.record_scenario_selection(scenario.name);
        return Some(PreparedCall {
            endpoint,
            scenario: Some(scenario),
            body: Some(scenario.payload()),
        });
    }

    let endpoint = catalog.regular().choose(rng)?;
    let body = endpoint.payload.map(|generate| generate(rng));
    Some(PreparedCall {
        endpoint,
        scenario: None,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    #[test]
    fn zero_and_hundred_percent_are_absolute() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!((0..1000).all(|_| !is_login_call(&mut rng, 0)));
        assert!((0..1000).all(|_| is_login_call(&mut rng, 100)));
    }

    #[test]
    fn login_share_is_roughly_honoured() {
        let mut rng = StdRng::seed_from_u64(2);
        let hits = (0..10_000).filter(|_| is_login_call(&mut rng, 20)).count();
        assert!((1700..2300).contains(&hits), "got {hits}");
    }

    #[test]
    fn login_selection_counts_the_scenario() {
        let catalog = Catalog::with_defaults(false);
        let agg = Aggregator::new();
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..200 {
            let call = select_call(&catalog, true, &mut rng, &agg).unwrap();
            assert!(call.is_login());
            let scenario = call.scenario.unwrap();
            assert_eq!(call.body, Some(scenario.payload()));
        }

        let login = agg.snapshot().login_metrics;
        assert_eq!(login.total, 200);
        assert_eq!(login.scenario_counts.values().sum::<u64>(), 200);
        assert_eq!(login.scenario_counts.len(), LOGIN_SCENARIOS.len());
    }

    #[test]
    fn regular_selection_never_touches_login_metrics() {
        let catalog = Catalog::with_defaults(false);
        let agg = Aggregator::new();
        let mut rng = StdRng::seed_from_u64(4);

        let mut seen = HashSet::new();
        for _ in 0..500 {
            let call = select_call(&catalog, false, &mut rng, &agg).unwrap();
            assert!(!call.is_login());
            assert!(call.body.is_none());
            seen.insert(call.endpoint.path.clone());
        }

        assert_eq!(seen.len(), catalog.regular().len());
        assert_eq!(agg.snapshot().login_metrics.total, 0);
    }

    #[test]
    fn missing_endpoint_kind_yields_none() {
        let catalog = Catalog::new(Vec::new()).unwrap();
        let agg = Aggregator::new();
        let mut rng = StdRng::seed_from_u64(5);
        assert!(select_call(&catalog, true, &mut rng, &agg).is_none());
        assert!(select_call(&catalog, false, &mut rng, &agg).is_none());
        assert_eq!(agg.snapshot().login_metrics.total, 0);
    }
}
