//! Filter evaluation for the in-memory driver.
//!
//! Understands top-level and dotted-path equality plus the comparison
//! operators `$eq`, `$ne`, `$in`, `$nin`, `$exists`, `$gt`, `$gte`, `$lt`
//! and `$lte`. Anything else never matches.

use std::cmp::Ordering;

use bson::{Bson, Document};

pub(crate) fn matches(document: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, expected)| {
        let actual = lookup(document, key);
        match expected {
            Bson::Document(ops) if is_operator_document(ops) => {
                ops.iter().all(|(op, operand)| apply(op, actual, operand))
            }
            _ => equals(actual, expected),
        }
    })
}

fn is_operator_document(doc: &Document) -> bool {
    !doc.is_empty() && doc.keys().all(|k| k.starts_with('$'))
}

fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = document.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(doc) => doc.get(part)?,
            Bson::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn apply(op: &str, actual: Option<&Bson>, operand: &Bson) -> bool {
    match op {
        "$eq" => equals(actual, operand),
        "$ne" => !equals(actual, operand),
        "$in" => match operand {
            Bson::Array(options) => options.iter().any(|o| equals(actual, o)),
            _ => false,
        },
        "$nin" => match operand {
            Bson::Array(options) => !options.iter().any(|o| equals(actual, o)),
            _ => false,
        },
        "$exists" => {
            let wanted = !matches!(operand, Bson::Boolean(false) | Bson::Int32(0));
            actual.is_some() == wanted
        }
        "$gt" => compare(actual, operand) == Some(Ordering::Greater),
        "$gte" => matches!(
            compare(actual, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        "$lt" => compare(actual, operand) == Some(Ordering::Less),
        "$lte" => matches!(
            compare(actual, operand),
            Some(Ordering::Less | Ordering::Equal)
        ),
        _ => false,
    }
}

/// Missing matches null; arrays match when any element does.
fn equals(actual: Option<&Bson>, expected: &Bson) -> bool {
    match actual {
        None => matches!(expected, Bson::Null),
        Some(Bson::Array(items)) if !matches!(expected, Bson::Array(_)) => {
            items.iter().any(|item| scalar_equals(item, expected))
        }
        Some(actual) => scalar_equals(actual, expected),
    }
}

fn scalar_equals(a: &Bson, b: &Bson) -> bool {
    match (number(a), number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(actual: Option<&Bson>, operand: &Bson) -> Option<Ordering> {
    let actual = actual?;
    if let (Some(x), Some(y)) = (number(actual), number(operand)) {
        return x.partial_cmp(&y);
    }
    match (actual, operand) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}
