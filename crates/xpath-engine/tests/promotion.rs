use chrono::{FixedOffset, Offset, Utc};
use rstest::rstest;
use rust_decimal::Decimal;
use xpath_engine::engine::compare::{ValueOp, compare_after_cast, compare_atomic, promote};
use xpath_engine::xdm::XdmAtomicValue as V;

fn utc() -> FixedOffset {
    Utc.fix()
}

fn numerics() -> Vec<V> {
    vec![
        V::Integer(2),
        V::Integer(-1),
        V::Decimal(Decimal::new(25, 1)),
        V::Decimal(Decimal::new(2, 0)),
        V::Float(2.5),
        V::Float(-1.0),
        V::Double(0.5),
        V::Double(2.0),
    ]
}

const OPS: [ValueOp; 6] = [ValueOp::Eq, ValueOp::Ne, ValueOp::Lt, ValueOp::Le, ValueOp::Gt, ValueOp::Ge];

#[rstest]
fn promotion_is_symmetric() {
    for a in numerics() {
        for b in numerics() {
            let (pa, pb) = promote(&a, &b).unwrap();
            let (qb, qa) = promote(&b, &a).unwrap();
            assert_eq!((&pa, &pb), (&qa, &qb), "{a:?} vs {b:?}");
            assert_eq!(pa.type_name(), pb.type_name());
        }
    }
}

#[rstest]
fn comparing_after_promotion_matches_comparing_after_cast() {
    for a in numerics() {
        for b in numerics() {
            let (pa, _) = promote(&a, &b).unwrap();
            let target = pa.type_name();
            for op in OPS {
                assert_eq!(
                    compare_atomic(&a, &b, op, utc()).unwrap(),
                    compare_after_cast(&a, &b, target, op, utc()).unwrap(),
                    "{a:?} {} {b:?} as {target}",
                    op.symbol()
                );
            }
        }
    }
}

#[rstest]
#[case(V::Integer(1), V::Decimal(Decimal::new(15, 1)), "decimal")]
#[case(V::Decimal(Decimal::new(15, 1)), V::Float(1.0), "float")]
#[case(V::Float(1.0), V::Double(1.0), "double")]
#[case(V::Integer(1), V::Double(1.0), "double")]
fn promotion_takes_the_wider_type(#[case] a: V, #[case] b: V, #[case] expected: &str) {
    let (pa, pb) = promote(&a, &b).unwrap();
    assert_eq!(pa.type_name().local_name(), expected);
    assert_eq!(pb.type_name().local_name(), expected);
}

#[rstest]
fn strings_and_numbers_do_not_promote() {
    assert!(promote(&V::String("1".into()), &V::Integer(1)).is_err());
}
