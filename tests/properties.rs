// Property tests for the value model and the standard library.

use ember_runtime::stdlib::{collections, format, strings};
use ember_runtime::trampoline::{resolve_trampoline, trampoline, Bounce};
use ember_runtime::value::{equals, len, to_int};
use ember_runtime::{StringBox, Value};
use proptest::prelude::*;

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        (-1000i64..1000).prop_map(Value::from),
        (-1.0e6f64..1.0e6).prop_map(Value::from),
        "[a-z]{0,3}".prop_map(|s| Value::atom(&s)),
        "[a-z ]{0,6}".prop_map(Value::from),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
            prop::collection::btree_map("[a-c]", inner, 0..3).prop_map(Value::Object),
        ]
    })
}

fn ints(xs: &[i64]) -> Value {
    Value::List(xs.iter().map(|&n| Value::from(n)).collect())
}

fn as_ints(v: &Value) -> Vec<i64> {
    match v {
        Value::List(items) => items
            .iter()
            .map(|x| x.as_number().unwrap_or(f64::NAN) as i64)
            .collect(),
        _ => Vec::new(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // =========================================================================
    // Equality
    // =========================================================================

    #[test]
    fn equality_is_reflexive(v in value()) {
        prop_assert!(equals(&v, &v), "{:?} is not equal to itself", v);
        prop_assert!(equals(&v, &v.clone()));
    }

    #[test]
    fn equality_is_symmetric(a in value(), b in value()) {
        prop_assert_eq!(equals(&a, &b), equals(&b, &a), "asymmetric for {:?} / {:?}", a, b);
    }

    #[test]
    fn empty_absorbs_everything(v in value()) {
        prop_assert!(equals(&Value::Empty, &v));
        prop_assert!(equals(&v, &Value::Empty));
    }

    #[test]
    fn strings_compare_by_content_not_box(s in "[a-z]{0,8}") {
        let a = Value::String(StringBox::from(s.as_str()));
        let b = Value::String(StringBox::from(s.clone()));
        prop_assert!(equals(&a, &b));
    }

    // =========================================================================
    // Conversions
    // =========================================================================

    #[test]
    fn int_parses_integral_strings(n in any::<i32>()) {
        prop_assert_eq!(to_int(&Value::from(n.to_string())), Value::from(n));
    }

    #[test]
    fn int_of_integral_numbers_is_identity(n in -100_000i64..100_000) {
        prop_assert_eq!(to_int(&Value::from(n)), Value::from(n));
    }

    // =========================================================================
    // Trampoline
    // =========================================================================

    #[test]
    fn trampoline_matches_direct_sum(n in 0u64..2_000) {
        let summed = resolve_trampoline(
            |(i, acc): (u64, u64)| {
                if i == 0 {
                    Ok(Bounce::Done(acc))
                } else {
                    Ok(trampoline((i - 1, acc + i)))
                }
            },
            (n, 0),
        );
        prop_assert_eq!(summed, Ok((1..=n).sum::<u64>()));
    }

    // =========================================================================
    // Collections
    // =========================================================================

    #[test]
    fn slice_length_follows_clamping(
        xs in prop::collection::vec(-100i64..100, 0..10),
        min in -20i64..20,
        max in -20i64..20,
    ) {
        let length = xs.len() as i64;
        let out = collections::slice(&ints(&xs), &Value::from(min), &Value::from(max))
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let end = max.clamp(0, length);
        let start = min.max(0).min(end);
        prop_assert_eq!(as_ints(&out), xs[start as usize..end as usize].to_vec());
    }

    #[test]
    fn uniq_removes_only_adjacent_repeats(xs in prop::collection::vec(0i64..3, 0..20)) {
        let out = collections::uniq(&ints(&xs), &Value::Null)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let mut expected = xs.clone();
        expected.dedup();
        prop_assert_eq!(as_ints(&out), expected);
    }

    #[test]
    fn partition_by_size_keeps_order(
        xs in prop::collection::vec(-50i64..50, 0..20),
        size in 1i64..6,
    ) {
        let groups = collections::partition(&ints(&xs), &Value::from(size))
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let flat = collections::flatten(&groups)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(as_ints(&flat), xs.clone());
        if let Value::List(groups) = &groups {
            for (i, group) in groups.iter().enumerate() {
                let n = len(group).map_err(|e| TestCaseError::fail(e.to_string()))?;
                if i + 1 < groups.len() {
                    prop_assert_eq!(n as i64, size);
                } else {
                    prop_assert!(n as i64 <= size && n > 0);
                }
            }
        }
    }

    #[test]
    fn reduce_folds_left_to_right(xs in prop::collection::vec(-1000i64..1000, 0..30)) {
        let sum = Value::function("sum", |args| {
            let acc = args[0].as_number().unwrap_or(0.0);
            Ok(Value::from(acc + args[1].as_number().unwrap_or(0.0)))
        });
        let total = collections::reduce(&ints(&xs), &Value::from(0), &sum)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(total, Value::from(xs.iter().sum::<i64>()));
    }

    // =========================================================================
    // Strings and formatting
    // =========================================================================

    #[test]
    fn join_undoes_split(s in "[a-z,.]{0,24}", sep in "[;|#]{1,3}") {
        let parts = strings::split(&Value::from(s.as_str()), &Value::from(sep.as_str()))
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let joined = strings::join(&parts, &Value::from(sep.as_str()))
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(joined, Value::from(s));
    }

    #[test]
    fn split_on_a_present_separator(a in "[a-z]{0,6}", b in "[a-z]{0,6}") {
        let parts = strings::split(&Value::from(format!("{}/{}", a, b)), &Value::from("/"))
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(parts, Value::List(vec![Value::from(a), Value::from(b)]));
    }

    #[test]
    fn positional_format_matches_display(a in -1000i64..1000, b in "[a-z]{0,5}") {
        let out = format::format(
            &StringBox::from("{{0}}-{{ 1 }}"),
            &[Value::from(a), Value::from(b.as_str())],
        )
        .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(out, Value::from(format!("{}-{}", a, b)));
    }
}
