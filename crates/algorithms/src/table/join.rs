//! Join attributes by field value
//!
//! One-to-one join: each left feature takes the attributes of the first
//! right row whose key matches. All right fields are copied; names that
//! collide with an existing field get a `_2`, `_3`, ... suffix.

use mopst_core::vector::{AttributeValue, FeatureCollection};
use mopst_core::{Algorithm, Error, Result};
use std::collections::HashMap;

/// Parameters for [`join_attributes`]
#[derive(Debug, Clone)]
pub struct JoinParams {
    /// Key field on the input (left) table
    pub left_key: String,
    /// Key field on the lookup (right) table
    pub right_key: String,
    /// Drop left features without a match instead of keeping them with nulls
    pub discard_nonmatching: bool,
    /// Prefix added to every copied field name
    pub prefix: String,
}

impl JoinParams {
    /// Keep-all join with no prefix
    pub fn new(left_key: impl Into<String>, right_key: impl Into<String>) -> Self {
        Self {
            left_key: left_key.into(),
            right_key: right_key.into(),
            discard_nonmatching: false,
            prefix: String::new(),
        }
    }
}

/// Result of a join
#[derive(Debug, Clone)]
pub struct JoinOutput {
    pub joined: FeatureCollection,
    /// Left features that found no matching right row
    pub unmatched: usize,
}

/// Join algorithm
#[derive(Debug, Clone, Default)]
pub struct JoinAttributes;

impl Algorithm for JoinAttributes {
    type Input = (FeatureCollection, FeatureCollection);
    type Output = JoinOutput;
    type Params = JoinParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "JoinAttributes"
    }

    fn description(&self) -> &'static str {
        "Copy attributes from a lookup table onto features with a matching key"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        join_attributes(&input.0, &input.1, &params)
    }
}

fn require_field(table: &FeatureCollection, field: &str) -> Result<()> {
    if !table.is_empty() && !table.has_field(field) {
        return Err(Error::FieldNotFound {
            field: field.to_string(),
            available: table.fields().to_vec(),
        });
    }
    Ok(())
}

fn unique_name(base: String, taken: &[String]) -> String {
    if !taken.contains(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}_{}", base, n);
        if !taken.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Join `right` onto `left` by key.
///
/// # Errors
/// A non-empty table that lacks its key field.
pub fn join_attributes(
    left: &FeatureCollection,
    right: &FeatureCollection,
    params: &JoinParams,
) -> Result<JoinOutput> {
    require_field(left, &params.left_key)?;
    require_field(right, &params.right_key)?;

    let mut lookup: HashMap<String, usize> = HashMap::new();
    for (idx, feature) in right.iter().enumerate() {
        let key = feature
            .get_property(&params.right_key)
            .and_then(AttributeValue::join_key);
        if let Some(key) = key {
            lookup.entry(key).or_insert(idx);
        }
    }

    let mut taken: Vec<String> = left.fields().to_vec();
    let mut copied: Vec<(String, String)> = Vec::with_capacity(right.fields().len());
    for field in right.fields() {
        let name = unique_name(format!("{}{}", params.prefix, field), &taken);
        taken.push(name.clone());
        copied.push((field.clone(), name));
    }

    let mut joined = FeatureCollection::with_fields(taken);
    let mut unmatched = 0;

    for feature in left.iter() {
        let matched = feature
            .get_property(&params.left_key)
            .and_then(AttributeValue::join_key)
            .and_then(|key| lookup.get(&key).copied());

        if matched.is_none() {
            unmatched += 1;
            if params.discard_nonmatching {
                continue;
            }
        }

        let mut out = feature.clone();
        for (source, target) in &copied {
            let value = match matched {
                Some(row) => right.value(row, source).clone(),
                None => AttributeValue::Null,
            };
            out.set_property(target.clone(), value);
        }
        joined.push(out);
    }

    tracing::debug!(
        left = left.len(),
        right = right.len(),
        unmatched,
        "joined on {} = {}",
        params.left_key,
        params.right_key
    );

    Ok(JoinOutput { joined, unmatched })
}
