//! Expression generator — pure cross-product expansion of fields × grammar.
//!
//! No I/O: given field descriptors and a grammar, render every candidate
//! alpha expression string deterministically. Loop nesting is field, then
//! time-series operator, then lookback days, then group operator, then
//! grouping — so output order is reproducible and a partially submitted batch
//! can be resumed by position.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::catalog::{FieldDescriptor, FieldType};

/// Operator and parameter choices for one generation batch. Configuration,
/// never mutated at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationGrammar {
    /// Time-series comparison operators. When empty, the fallback template
    /// normalizes each field by its capitalization companion instead.
    pub ts_ops: Vec<String>,
    /// Lookback windows, in days, for the time-series operators.
    pub lookback_days: Vec<u32>,
    /// Group comparison operators.
    pub group_ops: Vec<String>,
    /// Grouping expressions: bare group names or derived expressions such as
    /// `densify(...)`.
    pub group_by: Vec<String>,
    /// Companion field used by the fallback template; fields without one are
    /// skipped in that mode.
    pub cap_field: Option<String>,
}

impl Default for GenerationGrammar {
    fn default() -> Self {
        Self {
            ts_ops: vec![
                "ts_rank".to_string(),
                "ts_zscore".to_string(),
                "ts_av_diff".to_string(),
            ],
            lookback_days: vec![60, 200],
            group_ops: vec![
                "group_rank".to_string(),
                "group_zscore".to_string(),
                "group_neutralize".to_string(),
            ],
            group_by: vec![
                "market".to_string(),
                "industry".to_string(),
                "subindustry".to_string(),
                "sector".to_string(),
                densify("pv13_h_f1_sector"),
            ],
            cap_field: Some("cap".to_string()),
        }
    }
}

/// Render the densified form of a grouping field. The transform itself is
/// opaque to generation — it is an uninterpreted string template evaluated
/// by the platform.
pub fn densify(group_field: &str) -> String {
    format!("densify({group_field})")
}

/// A rendered candidate expression plus its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlphaExpression {
    pub expression: String,
    pub field_id: String,
    pub ts_op: Option<String>,
    pub days: Option<u32>,
    pub group_op: String,
    pub group_by: String,
}

/// Expand `fields` against `grammar` into deduplicated candidate
/// expressions, in deterministic insertion order.
///
/// Only MATRIX-typed fields participate: the templates compare a field
/// against its own time series or its peer group, which is meaningless for
/// vector or group fields. Duplicate rendered strings keep the first
/// occurrence; later provenance is discarded.
pub fn generate(fields: &[FieldDescriptor], grammar: &GenerationGrammar) -> Vec<AlphaExpression> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<AlphaExpression> = Vec::new();

    let mut push = |expr: AlphaExpression| {
        if seen.insert(expr.expression.clone()) {
            out.push(expr);
        }
    };

    for field in fields {
        if field.field_type != FieldType::Matrix {
            continue;
        }

        if grammar.ts_ops.is_empty() {
            // Fallback template: <group_op>(<field>/cap, <group>).
            let Some(cap) = &grammar.cap_field else {
                continue;
            };
            for group_op in &grammar.group_ops {
                for group in &grammar.group_by {
                    push(AlphaExpression {
                        expression: format!("{group_op}({}/{cap}, {group})", field.id),
                        field_id: field.id.clone(),
                        ts_op: None,
                        days: None,
                        group_op: group_op.clone(),
                        group_by: group.clone(),
                    });
                }
            }
            continue;
        }

        for ts_op in &grammar.ts_ops {
            for &days in &grammar.lookback_days {
                for group_op in &grammar.group_ops {
                    for group in &grammar.group_by {
                        push(AlphaExpression {
                            expression: format!(
                                "{group_op}({ts_op}({}, {days}), {group})",
                                field.id
                            ),
                            field_id: field.id.clone(),
                            ts_op: Some(ts_op.clone()),
                            days: Some(days),
                            group_op: group_op.clone(),
                            group_by: group.clone(),
                        });
                    }
                }
            }
        }
    }

    out
}
