//! The logical query form, normalized plan and analyzer.
//!
//! `LogicalQuery` is the pre-parsed, front-end-supplied AST the engine
//! consumes — no query surface syntax or parser lives in this crate.
//! `Analyzer::analyze` resolves field names to column indices, flattens
//! conjunctions, and produces an immutable [`Plan`].

use std::collections::HashMap;

use crate::column::Column;
use crate::error::{NotSupportedSnafu, Result, SchemaMismatchSnafu, SchemaTypeMismatchSnafu};
use crate::predicate::{ColumnPredicate, PredicateKind};
use crate::value::{LogicalType, Scalar};

/// One predicate as supplied by the front-end, addressed by field name
/// rather than a resolved column index.
#[derive(Debug, Clone)]
pub struct LogicalPredicate {
    pub field_name: String,
    pub kind: PredicateKind,
}

/// An ordered-by-column aggregate request: `(op, field_name, result_name)`.
#[derive(Debug, Clone)]
pub struct AggregateRequest {
    pub op: AggregateOp,
    pub field_name: String,
    pub result_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

/// A group-by specification: a key field plus a list of named aggregates.
#[derive(Debug, Clone)]
pub struct GroupBySpec {
    pub key_field: String,
    pub aggregates: Vec<AggregateRequest>,
}

/// The terminal operation a query ends in, addressed by field name (resolved
/// into [`ResolvedTerminal`] during analysis).
#[derive(Debug, Clone)]
pub enum Terminal {
    MaterializeAll,
    Count,
    Any,
    First,
    TakeN,
    SimpleAggregate { op: AggregateOp, field_name: String },
    MultiAggregate(Vec<AggregateRequest>),
    GroupBy(GroupBySpec),
}

/// The front-end-supplied, not-yet-analyzed logical query: conjunctions of
/// predicates, optional LIMIT/OFFSET, optional ORDER BY, one terminal.
#[derive(Debug, Clone)]
pub struct LogicalQuery {
    pub predicates: Vec<LogicalPredicate>,
    /// `true` if the front-end detected a disjunction it could not flatten
    /// into a pure conjunction; carried through so the analyzer can mark
    /// `fully_pushed = false`.
    pub has_disjunction: bool,
    pub skip: Option<usize>,
    pub take: Option<usize>,
    pub order_by: Option<String>,
    pub terminal: Terminal,
}

impl LogicalQuery {
    pub fn new(terminal: Terminal) -> Self {
        Self {
            predicates: Vec::new(),
            has_disjunction: false,
            skip: None,
            take: None,
            order_by: None,
            terminal,
        }
    }

    pub fn with_predicate(mut self, field_name: impl Into<String>, kind: PredicateKind) -> Self {
        self.predicates.push(LogicalPredicate { field_name: field_name.into(), kind });
        self
    }

    pub fn with_limit(mut self, skip: usize, take: usize) -> Self {
        self.skip = Some(skip);
        self.take = Some(take);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedTerminal {
    MaterializeAll,
    Count,
    Any,
    First,
    TakeN,
    SimpleAggregate,
    MultiAggregate,
    GroupBy,
}

/// An immutable, fully-resolved query plan: predicates after normalization
/// but *before* selectivity reordering (which happens per
/// execution against live zone-map stats), the resolved terminal, and the
/// set of column indices the query touches.
#[derive(Debug, Clone)]
pub struct Plan {
    pub predicates: Vec<ColumnPredicate>,
    pub skip: Option<usize>,
    pub take: Option<usize>,
    pub order_by_column: Option<usize>,
    pub resolved_terminal: ResolvedTerminal,
    pub simple_aggregate: Option<(AggregateOp, usize)>,
    pub multi_aggregate: Vec<(AggregateOp, usize, String)>,
    pub group_by: Option<ResolvedGroupBy>,
    pub touched_columns: Vec<usize>,
    /// `true` ⇔ no predicate required fallback materialization.
    pub fully_pushed: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedGroupBy {
    pub key_column: usize,
    pub aggregates: Vec<(AggregateOp, usize, String)>,
}

fn resolve_field(
    field_index_map: &HashMap<String, usize>,
    field_name: &str,
) -> Result<usize> {
    field_index_map
        .get(field_name)
        .copied()
        .ok_or_else(|| SchemaMismatchSnafu { column_name: field_name.to_owned() }.build())
}

/// Validates that `kind` can be evaluated against `column`'s logical type,
/// so a mismatched predicate (e.g. a numeric comparison against a boolean
/// column) fails with `schema_mismatch` during analysis rather than hitting
/// an `unreachable!` in a kernel at execution time.
fn validate_predicate_type(field_name: &str, kind: &PredicateKind, column: &Column) -> Result<()> {
    let column_type = column.logical_type();
    let expected: &[LogicalType] = match kind {
        PredicateKind::Numeric { literal, .. } => {
            let literal_type = literal.logical_type();
            if literal_type == column_type {
                return Ok(());
            }
            return SchemaTypeMismatchSnafu {
                column_name: field_name.to_owned(),
                column_type: column_type.to_string(),
                expected: literal_type.to_string(),
            }
            .fail();
        }
        PredicateKind::StringEquality { .. } | PredicateKind::StringOp { .. } => {
            &[LogicalType::Utf8]
        }
        PredicateKind::BooleanEquals { .. } => &[LogicalType::Boolean],
        PredicateKind::IsNull | PredicateKind::IsNotNull => return Ok(()),
    };
    if expected.contains(&column_type) {
        return Ok(());
    }
    SchemaTypeMismatchSnafu {
        column_name: field_name.to_owned(),
        column_type: column_type.to_string(),
        expected: expected.iter().map(LogicalType::to_string).collect::<Vec<_>>().join(" or "),
    }
    .fail()
}

/// Validates that `op` can run over `column`'s logical type. `Sum`/`Avg`
/// require a numeric type (binary and string aggregation has no defined
/// arithmetic); `Min`/`Max`/`Count` accept any orderable type except binary,
/// which has no ordering defined here.
fn validate_aggregate_type(field_name: &str, op: AggregateOp, column: &Column) -> Result<()> {
    let column_type = column.logical_type();
    let ok = match op {
        AggregateOp::Count => true,
        AggregateOp::Sum | AggregateOp::Avg => matches!(
            column_type,
            LogicalType::Int64
                | LogicalType::UInt64
                | LogicalType::Float64
                | LogicalType::Decimal
                | LogicalType::Timestamp
        ),
        AggregateOp::Min | AggregateOp::Max => column_type != LogicalType::Binary,
    };
    if ok {
        return Ok(());
    }
    SchemaTypeMismatchSnafu {
        column_name: field_name.to_owned(),
        column_type: column_type.to_string(),
        expected: "a type compatible with this aggregate".to_owned(),
    }
    .fail()
}

pub struct Analyzer;

impl Analyzer {
    /// Resolves a [`LogicalQuery`] against a `field_name → column_index` map
    /// into a normalized [`Plan`]. Fails with `schema_mismatch` if any
    /// referenced field is unknown.
    pub fn analyze(
        query: &LogicalQuery,
        field_index_map: &HashMap<String, usize>,
        columns: &[Column],
        strict_mode: bool,
    ) -> Result<Plan> {
        let mut touched = Vec::new();
        let mut resolved_predicates = Vec::with_capacity(query.predicates.len());

        for predicate in &query.predicates {
            let column_index = resolve_field(field_index_map, &predicate.field_name)?;
            validate_predicate_type(&predicate.field_name, &predicate.kind, &columns[column_index])?;
            touched.push(column_index);
            resolved_predicates.push(ColumnPredicate::new(column_index, predicate.kind.clone()));
        }

        if query.has_disjunction && strict_mode {
            return NotSupportedSnafu {
                reason: "disjunctions (OR) are not supported in strict mode",
            }
            .fail();
        }

        let order_by_column = query
            .order_by
            .as_deref()
            .map(|name| resolve_field(field_index_map, name))
            .transpose()?;
        if let Some(c) = order_by_column {
            touched.push(c);
        }

        let (resolved_terminal, simple_aggregate, multi_aggregate, group_by) =
            match &query.terminal {
                Terminal::MaterializeAll => (ResolvedTerminal::MaterializeAll, None, Vec::new(), None),
                Terminal::Count => (ResolvedTerminal::Count, None, Vec::new(), None),
                Terminal::Any => (ResolvedTerminal::Any, None, Vec::new(), None),
                Terminal::First => (ResolvedTerminal::First, None, Vec::new(), None),
                Terminal::TakeN => (ResolvedTerminal::TakeN, None, Vec::new(), None),
                Terminal::SimpleAggregate { op, field_name } => {
                    let column_index = resolve_field(field_index_map, field_name)?;
                    validate_aggregate_type(field_name, *op, &columns[column_index])?;
                    touched.push(column_index);
                    (
                        ResolvedTerminal::SimpleAggregate,
                        Some((*op, column_index)),
                        Vec::new(),
                        None,
                    )
                }
                Terminal::MultiAggregate(requests) => {
                    let mut resolved = Vec::with_capacity(requests.len());
                    for request in requests {
                        let column_index = resolve_field(field_index_map, &request.field_name)?;
                        validate_aggregate_type(&request.field_name, request.op, &columns[column_index])?;
                        touched.push(column_index);
                        resolved.push((request.op, column_index, request.result_name.clone()));
                    }
                    (ResolvedTerminal::MultiAggregate, None, resolved, None)
                }
                Terminal::GroupBy(spec) => {
                    let key_column = resolve_field(field_index_map, &spec.key_field)?;
                    if columns[key_column].logical_type() == LogicalType::Binary {
                        return SchemaTypeMismatchSnafu {
                            column_name: spec.key_field.clone(),
                            column_type: LogicalType::Binary.to_string(),
                            expected: "a hashable, non-binary key type".to_owned(),
                        }
                        .fail();
                    }
                    touched.push(key_column);
                    let mut resolved = Vec::with_capacity(spec.aggregates.len());
                    for request in &spec.aggregates {
                        let column_index = resolve_field(field_index_map, &request.field_name)?;
                        validate_aggregate_type(&request.field_name, request.op, &columns[column_index])?;
                        touched.push(column_index);
                        resolved.push((request.op, column_index, request.result_name.clone()));
                    }
                    (
                        ResolvedTerminal::GroupBy,
                        None,
                        Vec::new(),
                        Some(ResolvedGroupBy { key_column, aggregates: resolved }),
                    )
                }
            };

        // Validate every touched column index actually exists in the batch.
        for &column_index in &touched {
            if column_index >= columns.len() {
                return SchemaMismatchSnafu { column_name: format!("#{column_index}") }.fail();
            }
        }

        touched.sort_unstable();
        touched.dedup();

        let fully_pushed = !query.has_disjunction;

        Ok(Plan {
            predicates: resolved_predicates,
            skip: query.skip,
            take: query.take,
            order_by_column,
            resolved_terminal,
            simple_aggregate,
            multi_aggregate,
            group_by,
            touched_columns: touched,
            fully_pushed,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::column::cmp::Operator;
    use arrow::array::{BooleanArray, Int64Array};

    fn fixture() -> (HashMap<String, usize>, Vec<Column>) {
        let mut map = HashMap::new();
        map.insert("Value".to_owned(), 0);
        map.insert("IsActive".to_owned(), 1);
        let columns = vec![
            Column::Int64(Int64Array::from(vec![1, 2, 3])),
            Column::Boolean(BooleanArray::from(vec![true, false, true])),
        ];
        (map, columns)
    }

    #[test]
    fn analyze_resolves_field_names() {
        let (map, columns) = fixture();
        let query = LogicalQuery::new(Terminal::Count).with_predicate(
            "Value",
            PredicateKind::Numeric { op: Operator::GT, literal: Scalar::I64(1) },
        );
        let plan = Analyzer::analyze(&query, &map, &columns, true).unwrap();
        assert_eq!(plan.predicates[0].column_index, 0);
        assert_eq!(plan.resolved_terminal, ResolvedTerminal::Count);
        assert!(plan.fully_pushed);
    }

    #[test]
    fn analyze_fails_on_unknown_field() {
        let (map, columns) = fixture();
        let query = LogicalQuery::new(Terminal::Count)
            .with_predicate("Missing", PredicateKind::IsNull);
        assert!(Analyzer::analyze(&query, &map, &columns, true).is_err());
    }

    #[test]
    fn analyze_rejects_disjunction_in_strict_mode() {
        let (map, columns) = fixture();
        let mut query = LogicalQuery::new(Terminal::Count);
        query.has_disjunction = true;
        assert!(Analyzer::analyze(&query, &map, &columns, true).is_err());
        assert!(Analyzer::analyze(&query, &map, &columns, false).is_ok());
    }

    #[test]
    fn analyze_rejects_predicate_literal_type_mismatch() {
        let (map, columns) = fixture();
        // "IsActive" is Boolean; a numeric predicate against it is a type error.
        let query = LogicalQuery::new(Terminal::Count).with_predicate(
            "IsActive",
            PredicateKind::Numeric { op: Operator::GT, literal: Scalar::I64(1) },
        );
        assert!(Analyzer::analyze(&query, &map, &columns, true).is_err());
    }

    #[test]
    fn analyze_rejects_string_predicate_on_non_string_column() {
        let (map, columns) = fixture();
        let query = LogicalQuery::new(Terminal::Count).with_predicate(
            "Value",
            PredicateKind::StringEquality {
                literal: "x".to_owned(),
                negate: false,
                case_insensitive: false,
            },
        );
        assert!(Analyzer::analyze(&query, &map, &columns, true).is_err());
    }

    #[test]
    fn analyze_rejects_sum_on_boolean_column() {
        let (map, columns) = fixture();
        let query = LogicalQuery::new(Terminal::SimpleAggregate {
            op: AggregateOp::Sum,
            field_name: "IsActive".to_owned(),
        });
        assert!(Analyzer::analyze(&query, &map, &columns, true).is_err());
    }

    #[test]
    fn analyze_group_by_resolves_key_and_aggregates() {
        let (map, columns) = fixture();
        let query = LogicalQuery::new(Terminal::GroupBy(GroupBySpec {
            key_field: "IsActive".to_owned(),
            aggregates: vec![AggregateRequest {
                op: AggregateOp::Sum,
                field_name: "Value".to_owned(),
                result_name: "sum".to_owned(),
            }],
        }));
        let plan = Analyzer::analyze(&query, &map, &columns, true).unwrap();
        let group_by = plan.group_by.unwrap();
        assert_eq!(group_by.key_column, 1);
        assert_eq!(group_by.aggregates[0].1, 0);
    }

    #[test]
    fn analyze_rejects_binary_group_by_key() {
        let mut map = HashMap::new();
        map.insert("Value".to_owned(), 0);
        map.insert("Blob".to_owned(), 1);
        let columns = vec![
            Column::Int64(Int64Array::from(vec![1, 2, 3])),
            Column::Binary(arrow::array::BinaryArray::from(vec![
                b"a".as_ref(),
                b"b".as_ref(),
                b"c".as_ref(),
            ])),
        ];
        let query = LogicalQuery::new(Terminal::GroupBy(GroupBySpec {
            key_field: "Blob".to_owned(),
            aggregates: vec![AggregateRequest {
                op: AggregateOp::Sum,
                field_name: "Value".to_owned(),
                result_name: "sum".to_owned(),
            }],
        }));
        assert!(Analyzer::analyze(&query, &map, &columns, true).is_err());
    }
}
