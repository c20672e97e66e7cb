//! Scenarios, quantities and the per-scenario running sums
//!
//! Every scenario (the baseline included) owns four accumulators, one per
//! [`Quantity`]. An accumulator starts empty, takes the first factor's
//! layer as-is and is replaced by `acc + layer` for every later factor.

use std::collections::BTreeMap;
use std::fmt;

use mopst_core::Raster;

use crate::error::{Error, Result};
use crate::weights::Coefficients;

/// Name of the unscaled pseudo-scenario
pub const BASELINE: &str = "BASELINE";

/// A scenario entry: the baseline or a named future
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScenarioName {
    Baseline,
    Named(String),
}

impl ScenarioName {
    pub fn as_str(&self) -> &str {
        match self {
            ScenarioName::Baseline => BASELINE,
            ScenarioName::Named(name) => name,
        }
    }

    pub fn is_baseline(&self) -> bool {
        matches!(self, ScenarioName::Baseline)
    }
}

impl fmt::Display for ScenarioName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    Summer,
    Winter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Pressure,
    Opportunity,
}

impl Kind {
    /// The coefficient of this kind
    pub fn pick(self, coefficients: &Coefficients) -> f64 {
        match self {
            Kind::Pressure => coefficients.pressure,
            Kind::Opportunity => coefficients.opportunity,
        }
    }
}

/// One of the four published quantities
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Quantity {
    PressureSummer,
    OpportunitySummer,
    PressureWinter,
    OpportunityWinter,
}

impl Quantity {
    /// All quantities, in publishing order
    pub const ALL: [Quantity; 4] = [
        Quantity::PressureSummer,
        Quantity::OpportunitySummer,
        Quantity::PressureWinter,
        Quantity::OpportunityWinter,
    ];

    pub fn season(self) -> Season {
        match self {
            Quantity::PressureSummer | Quantity::OpportunitySummer => Season::Summer,
            Quantity::PressureWinter | Quantity::OpportunityWinter => Season::Winter,
        }
    }

    pub fn kind(self) -> Kind {
        match self {
            Quantity::PressureSummer | Quantity::PressureWinter => Kind::Pressure,
            Quantity::OpportunitySummer | Quantity::OpportunityWinter => Kind::Opportunity,
        }
    }

    /// Output file name without extension
    pub fn file_stem(self) -> &'static str {
        match self {
            Quantity::PressureSummer => "pressure-summer",
            Quantity::OpportunitySummer => "opportunity-summer",
            Quantity::PressureWinter => "pressure-winter",
            Quantity::OpportunityWinter => "opportunity-winter",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

/// One value per quantity
#[derive(Debug, Clone, PartialEq)]
pub struct QuantityLayers<T>([T; 4]);

impl<T> QuantityLayers<T> {
    pub fn from_fn(mut f: impl FnMut(Quantity) -> T) -> Self {
        Self(Quantity::ALL.map(&mut f))
    }

    /// Build from a fallible function, stopping at the first error.
    /// Quantities are visited in [`Quantity::ALL`] order.
    pub fn try_from_fn<E>(mut f: impl FnMut(Quantity) -> std::result::Result<T, E>) -> std::result::Result<Self, E> {
        let [a, b, c, d] = Quantity::ALL;
        Ok(Self([f(a)?, f(b)?, f(c)?, f(d)?]))
    }

    pub fn get(&self, quantity: Quantity) -> &T {
        &self.0[quantity.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Quantity, &T)> {
        Quantity::ALL.into_iter().zip(self.0.iter())
    }
}

impl<T> IntoIterator for QuantityLayers<T> {
    type Item = (Quantity, T);
    type IntoIter = std::iter::Zip<std::array::IntoIter<Quantity, 4>, std::array::IntoIter<T, 4>>;

    fn into_iter(self) -> Self::IntoIter {
        Quantity::ALL.into_iter().zip(self.0)
    }
}

impl<T> std::ops::Index<Quantity> for QuantityLayers<T> {
    type Output = T;

    fn index(&self, quantity: Quantity) -> &T {
        self.get(quantity)
    }
}

/// Position of a scenario within its [`ScenarioSet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScenarioId(usize);

/// Ordered scenario entries: named scenarios in first-occurrence order,
/// then the baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSet {
    entries: Vec<ScenarioName>,
}

impl ScenarioSet {
    pub fn new<I>(named: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut entries: Vec<ScenarioName> = Vec::new();
        for name in named {
            let entry = ScenarioName::Named(name.into());
            if !entries.contains(&entry) {
                entries.push(entry);
            }
        }
        entries.push(ScenarioName::Baseline);
        Self { entries }
    }

    /// Number of entries, the baseline included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Never true: the baseline is always present
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of named scenarios
    pub fn named_count(&self) -> usize {
        self.entries.len() - 1
    }

    pub fn iter(&self) -> impl Iterator<Item = (ScenarioId, &ScenarioName)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, name)| (ScenarioId(i), name))
    }

    pub fn named(&self) -> impl Iterator<Item = &ScenarioName> {
        self.entries.iter().filter(|name| !name.is_baseline())
    }

    pub fn name(&self, id: ScenarioId) -> Option<&ScenarioName> {
        self.entries.get(id.0)
    }

    pub fn baseline(&self) -> ScenarioId {
        ScenarioId(self.entries.len() - 1)
    }
}

#[derive(Debug)]
struct Accumulator {
    raster: Raster<f64>,
    contributions: usize,
}

/// Final rasters of one scenario
#[derive(Debug, Clone)]
pub struct ScenarioOutput {
    pub scenario: ScenarioName,
    pub layers: QuantityLayers<Raster<f64>>,
}

/// Running sums keyed by `(scenario, quantity)`
#[derive(Debug, Default)]
pub struct ScenarioAccumulator {
    slots: BTreeMap<(ScenarioId, Quantity), Accumulator>,
}

impl ScenarioAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one factor's layer into the `(scenario, quantity)` sum.
    ///
    /// The first layer is stored without calling `add`; afterwards the sum
    /// is replaced by `add(sum, layer)`. Returns whether `add` ran.
    pub fn fold<E>(
        &mut self,
        scenario: ScenarioId,
        quantity: Quantity,
        layer: Raster<f64>,
        add: impl FnOnce(&Raster<f64>, &Raster<f64>) -> std::result::Result<Raster<f64>, E>,
    ) -> std::result::Result<bool, E> {
        match self.slots.get_mut(&(scenario, quantity)) {
            Some(acc) => {
                acc.raster = add(&acc.raster, &layer)?;
                acc.contributions += 1;
                Ok(true)
            }
            None => {
                self.slots.insert(
                    (scenario, quantity),
                    Accumulator {
                        raster: layer,
                        contributions: 1,
                    },
                );
                Ok(false)
            }
        }
    }

    /// Contributions folded into one accumulator so far
    pub fn contributions(&self, scenario: ScenarioId, quantity: Quantity) -> usize {
        self.slots
            .get(&(scenario, quantity))
            .map_or(0, |acc| acc.contributions)
    }

    /// Hand out the final rasters, in scenario-set order.
    ///
    /// # Errors
    /// [`Error::IncompleteAccumulation`] if any accumulator of the set did
    /// not receive exactly `expected` contributions.
    pub fn finish(mut self, set: &ScenarioSet, expected: usize) -> Result<Vec<ScenarioOutput>> {
        set.iter()
            .map(|(id, name)| {
                let layers = QuantityLayers::try_from_fn(|quantity| {
                    match self.slots.remove(&(id, quantity)) {
                        Some(acc) if acc.contributions == expected => Ok(acc.raster),
                        other => Err(Error::IncompleteAccumulation {
                            scenario: name.to_string(),
                            quantity: quantity.to_string(),
                            folded: other.map_or(0, |acc| acc.contributions),
                            expected,
                        }),
                    }
                })?;
                Ok(ScenarioOutput {
                    scenario: name.clone(),
                    layers,
                })
            })
            .collect()
    }
}
