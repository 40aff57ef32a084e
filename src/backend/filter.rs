use std::{cmp::Ordering, fmt, str::FromStr};

use serde_json::Value;

use super::{BackendError, Row, INVALID_TEXT};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
}

impl FilterOp {
    fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::In => "in",
        }
    }
}

/// A change-feed filter in the hosted backend's `column=op.value` syntax,
/// e.g. `empresa_uid=eq.3f1c` or `status=in.(pendente,concluido)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterExpr {
    pub column: String,
    pub op: FilterOp,
    pub values: Vec<String>,
}

impl FilterExpr {
    pub fn eq(column: &str, value: &str) -> Self {
        Self {
            column: column.to_string(),
            op: FilterOp::Eq,
            values: vec![value.to_string()],
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        let Some(actual) = row.get(&self.column) else {
            return false;
        };
        if actual.is_null() {
            return false;
        }
        match self.op {
            FilterOp::Eq => compare(actual, &self.values[0]) == Some(Ordering::Equal),
            FilterOp::Neq => compare(actual, &self.values[0]).is_some_and(|o| o != Ordering::Equal),
            FilterOp::Lt => compare(actual, &self.values[0]) == Some(Ordering::Less),
            FilterOp::Lte => compare(actual, &self.values[0]).is_some_and(|o| o != Ordering::Greater),
            FilterOp::Gt => compare(actual, &self.values[0]) == Some(Ordering::Greater),
            FilterOp::Gte => compare(actual, &self.values[0]).is_some_and(|o| o != Ordering::Less),
            FilterOp::In => self
                .values
                .iter()
                .any(|v| compare(actual, v) == Some(Ordering::Equal)),
        }
    }
}

fn compare(actual: &Value, expected: &str) -> Option<Ordering> {
    match actual {
        Value::String(s) => Some(s.as_str().cmp(expected)),
        Value::Number(n) => {
            let lhs = n.as_f64()?;
            let rhs = expected.parse::<f64>().ok()?;
            lhs.partial_cmp(&rhs)
        }
        Value::Bool(b) => {
            let rhs = expected.parse::<bool>().ok()?;
            Some(b.cmp(&rhs))
        }
        _ => None,
    }
}

fn invalid(expr: &str, reason: &str) -> BackendError {
    BackendError::rejected(INVALID_TEXT, format!("invalid filter '{}': {}", expr, reason))
}

impl FromStr for FilterExpr {
    type Err = BackendError;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let (column, rest) = expr
            .split_once('=')
            .ok_or_else(|| invalid(expr, "expected column=op.value"))?;
        let column = column.trim();
        if column.is_empty() || !column.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(invalid(expr, "bad column name"));
        }
        let (op, value) = rest
            .split_once('.')
            .ok_or_else(|| invalid(expr, "expected op.value"))?;
        let op = match op {
            "eq" => FilterOp::Eq,
            "neq" => FilterOp::Neq,
            "lt" => FilterOp::Lt,
            "lte" => FilterOp::Lte,
            "gt" => FilterOp::Gt,
            "gte" => FilterOp::Gte,
            "in" => FilterOp::In,
            other => return Err(invalid(expr, &format!("unknown operator '{}'", other))),
        };
        let values = if op == FilterOp::In {
            let list = value
                .strip_prefix('(')
                .and_then(|v| v.strip_suffix(')'))
                .ok_or_else(|| invalid(expr, "in expects (a,b,...)"))?;
            list.split(',')
                .map(|v| v.trim().trim_matches('"').to_string())
                .filter(|v| !v.is_empty())
                .collect::<Vec<_>>()
        } else {
            vec![value.to_string()]
        };
        if values.is_empty() {
            return Err(invalid(expr, "missing value"));
        }
        Ok(FilterExpr {
            column: column.to_string(),
            op,
            values,
        })
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.op == FilterOp::In {
            write!(f, "{}=in.({})", self.column, self.values.join(","))
        } else {
            write!(f, "{}={}.{}", self.column, self.op.as_str(), self.values[0])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn parses_tenant_equality() -> anyhow::Result<()> {
        let expr: FilterExpr = "empresa_uid=eq.0190a1b2-aaaa".parse()?;
        assert_eq!(expr, FilterExpr::eq("empresa_uid", "0190a1b2-aaaa"));
        assert_eq!(expr.to_string(), "empresa_uid=eq.0190a1b2-aaaa");
        Ok(())
    }

    #[test]
    fn value_may_contain_dots() -> anyhow::Result<()> {
        let expr: FilterExpr = "email=eq.ana@gabinete.gov.br".parse()?;
        assert_eq!(expr.values, vec!["ana@gabinete.gov.br".to_string()]);
        Ok(())
    }

    #[test]
    fn rejects_malformed_expressions() {
        for bad in ["empresa_uid", "empresa_uid=eq", "=eq.1", "a b=eq.1", "x=like.1", "x=in.1,2", "x=in.()"] {
            let err = bad.parse::<FilterExpr>().unwrap_err();
            assert_eq!(err.code(), INVALID_TEXT, "{}", bad);
        }
    }

    #[test]
    fn matches_strings_numbers_and_lists() -> anyhow::Result<()> {
        let r = row(json!({"empresa_uid": "t1", "idade": 42, "status": "pendente", "cpf": null}));

        assert!("empresa_uid=eq.t1".parse::<FilterExpr>()?.matches(&r));
        assert!(!"empresa_uid=eq.t2".parse::<FilterExpr>()?.matches(&r));
        assert!("empresa_uid=neq.t2".parse::<FilterExpr>()?.matches(&r));
        assert!("idade=gt.40".parse::<FilterExpr>()?.matches(&r));
        assert!("idade=lte.42".parse::<FilterExpr>()?.matches(&r));
        assert!(!"idade=lt.42".parse::<FilterExpr>()?.matches(&r));
        assert!("status=in.(concluido,pendente)".parse::<FilterExpr>()?.matches(&r));
        // null and missing columns never match, not even neq
        assert!(!"cpf=neq.123".parse::<FilterExpr>()?.matches(&r));
        assert!(!"bairro=eq.CENTRO".parse::<FilterExpr>()?.matches(&r));
        Ok(())
    }
}
