//! # Overload Resolver
//!
//! Picks the one overload of a [`MethodGroup`] that an argument list should
//! invoke.
//!
//! Candidates are filtered by receiver presence and arity, then every
//! argument is scored against its parameter with [`conversion`]. A rejected
//! position eliminates the candidate. The lowest total wins, and a tie for
//! lowest is an error rather than a guess.
//!
//! Resolution runs on every call. Nothing is memoized, so the answer depends
//! only on the group, the receiver flag and the argument kinds.

use std::fmt;

use crate::error::Result;
use crate::marshal::conversion;
use crate::reflect::MethodGroup;
use crate::reflect::Overload;
use crate::reflect::TypeOracle;
use crate::value::Value;

/// Why no overload was chosen. Ordered by how close the call came.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchFailure {
    /// No overload has the right arity and staticness.
    NoCandidates,
    /// Candidates exist but each rejects some argument.
    Rejected,
    /// This many candidates tie for the lowest cost.
    Ambiguous(usize),
}

impl fmt::Display for MatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCandidates => write!(f, "no overload takes that many arguments"),
            Self::Rejected => write!(f, "argument types do not match any overload"),
            Self::Ambiguous(n) => write!(f, "{} overloads match equally well", n),
        }
    }
}

/// Total conversion cost of `args` for `overload`, or `None` if any
/// position is rejected.
pub fn score(overload: &Overload, args: &[Value], oracle: &dyn TypeOracle) -> Result<Option<u32>> {
    let mut total = 0;
    for (param, arg) in overload.params.iter().zip(args) {
        match conversion(arg, param, oracle)? {
            Some(c) => total += c.cost(),
            None => return Ok(None),
        }
    }
    Ok(Some(total))
}

/// Selects the overload of `group` to invoke.
///
/// With `receiver_present` only instance overloads qualify; without it only
/// static ones (constructors count as static). The outer error is a failure
/// to reflect on an argument's type; the inner one is a genuine mismatch.
pub fn resolve<'g>(
    group: &'g MethodGroup,
    receiver_present: bool,
    args: &[Value],
    oracle: &dyn TypeOracle,
) -> Result<std::result::Result<&'g Overload, MatchFailure>> {
    let candidates: Vec<&Overload> = group
        .overloads
        .iter()
        .filter(|o| o.is_static != receiver_present && o.params.len() == args.len())
        .collect();
    if candidates.is_empty() {
        tracing::trace!(method = %group.name, arity = args.len(), receiver_present, "no candidates");
        return Ok(Err(MatchFailure::NoCandidates));
    }

    let mut scored: Vec<(&Overload, u32)> = Vec::with_capacity(candidates.len());
    for overload in candidates {
        if let Some(cost) = score(overload, args, oracle)? {
            scored.push((overload, cost));
        }
    }
    let Some(best) = scored.iter().map(|(_, cost)| *cost).min() else {
        tracing::trace!(method = %group.name, "every candidate rejected the arguments");
        return Ok(Err(MatchFailure::Rejected));
    };

    let mut winners = scored.into_iter().filter(|(_, cost)| *cost == best);
    Ok(match (winners.next(), winners.count()) {
        (Some((overload, _)), 0) => {
            tracing::trace!(method = %group.name, params = ?overload.params, cost = best, "resolved overload");
            Ok(overload)
        }
        (_, others) => Err(MatchFailure::Ambiguous(others + 1)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use xenoabi::MethodId;

    use crate::error::Error;
    use xenoabi::PrimitiveKind;
    use xenoabi::TypeSig;

    struct Flat;

    impl TypeOracle for Flat {
        fn distance(&self, from: &str, to: &str) -> Result<Option<u32>> {
            Ok(match (from, to) {
                (a, b) if a == b => Some(0),
                (_, "java.lang.Object") => Some(1),
                _ => None,
            })
        }
    }

    struct Unreachable;

    impl TypeOracle for Unreachable {
        fn distance(&self, from: &str, _to: &str) -> Result<Option<u32>> {
            Err(Error::ClassNotFound(from.to_string()))
        }
    }

    fn p(kind: PrimitiveKind) -> TypeSig {
        TypeSig::Primitive(kind)
    }

    fn group(overloads: Vec<(bool, Vec<TypeSig>)>) -> MethodGroup {
        MethodGroup {
            name: "m".to_string(),
            overloads: overloads
                .into_iter()
                .enumerate()
                .map(|(i, (is_static, params))| Overload {
                    id: MethodId(i as u64),
                    is_static,
                    params,
                    ret: TypeSig::Void,
                    declaring_class: "demo.Target".to_string(),
                })
                .collect(),
        }
    }

    fn pick(g: &MethodGroup, receiver: bool, args: &[Value]) -> std::result::Result<u64, MatchFailure> {
        resolve(g, receiver, args, &Flat).expect("oracle").map(|o| o.id.0)
    }

    #[test]
    fn test_exact_beats_widening() {
        use PrimitiveKind::*;
        let g = group(vec![
            (true, vec![p(Double)]),
            (true, vec![p(Long)]),
            (true, vec![p(Int)]),
            (true, vec![p(Float)]),
        ]);
        assert_eq!(pick(&g, false, &[Value::Int(1)]), Ok(2));
        assert_eq!(pick(&g, false, &[Value::Long(1)]), Ok(1));
        assert_eq!(pick(&g, false, &[Value::Short(1)]), Ok(2));
        assert_eq!(pick(&g, false, &[Value::Float(1.0)]), Ok(3));
    }

    #[test]
    fn test_widening_beats_boxing_beats_null() {
        let g = group(vec![
            (true, vec![TypeSig::object("java.lang.Object")]),
            (true, vec![p(PrimitiveKind::Double)]),
        ]);
        assert_eq!(pick(&g, false, &[Value::Int(1)]), Ok(1));
        assert_eq!(pick(&g, false, &[Value::Null]), Ok(0));
        assert_eq!(pick(&g, false, &[Value::Str("s".into())]), Ok(0));
    }

    #[test]
    fn test_receiver_presence_filters() {
        let g = group(vec![(false, vec![]), (true, vec![])]);
        assert_eq!(pick(&g, true, &[]), Ok(0));
        assert_eq!(pick(&g, false, &[]), Ok(1));
    }

    #[test]
    fn test_arity_mismatch_is_no_candidates() {
        let g = group(vec![(true, vec![p(PrimitiveKind::Double)])]);
        assert_eq!(pick(&g, false, &[]), Err(MatchFailure::NoCandidates));
        assert_eq!(pick(&g, false, &[Value::Int(4), Value::Int(2)]), Err(MatchFailure::NoCandidates));
    }

    #[test]
    fn test_rejected_position_eliminates_candidate() {
        let g = group(vec![(true, vec![p(PrimitiveKind::Int), p(PrimitiveKind::Int)])]);
        assert_eq!(pick(&g, false, &[Value::Int(1), Value::Double(2.0)]), Err(MatchFailure::Rejected));
        assert_eq!(pick(&g, false, &[Value::Int(1), Value::Null]), Err(MatchFailure::Rejected));
    }

    #[test]
    fn test_tie_is_ambiguous() {
        use PrimitiveKind::*;
        let g = group(vec![(true, vec![p(Long), p(Double)]), (true, vec![p(Double), p(Long)])]);
        assert_eq!(pick(&g, false, &[Value::Int(1), Value::Int(2)]), Err(MatchFailure::Ambiguous(2)));
        // A double cannot narrow to long, which leaves one candidate.
        assert_eq!(pick(&g, false, &[Value::Double(1.0), Value::Int(2)]), Ok(1));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        use PrimitiveKind::*;
        let g = group(vec![(true, vec![p(Long)]), (true, vec![p(Float)]), (true, vec![p(Double)])]);
        let args = [Value::Int(3)];
        let first = pick(&g, false, &args);
        for _ in 0..10 {
            assert_eq!(pick(&g, false, &args), first);
        }
        assert_eq!(first, Ok(0));
    }

    #[test]
    fn test_oracle_errors_are_not_mismatches() {
        let g = group(vec![
            (true, vec![p(PrimitiveKind::Int)]),
            (true, vec![TypeSig::object("java.lang.Object")]),
        ]);
        let err = resolve(&g, false, &[Value::Boolean(true)], &Unreachable).unwrap_err();
        match err {
            Error::ClassNotFound(name) => assert_eq!(name, "java.lang.Boolean"),
            _ => panic!("Expected ClassNotFound, got {:?}", err),
        }

        // Arity is checked before any type is consulted.
        let picked = resolve(&g, false, &[], &Unreachable).expect("no lookups");
        assert_eq!(picked.map(|o| o.id.0), Err(MatchFailure::NoCandidates));
    }

    #[test]
    fn test_failure_order() {
        assert!(MatchFailure::NoCandidates < MatchFailure::Rejected);
        assert!(MatchFailure::Rejected < MatchFailure::Ambiguous(2));
        assert_eq!(MatchFailure::Ambiguous(3).to_string(), "3 overloads match equally well");
    }
}
