use proptest::prelude::*;

use fanout::config::InputPolicy;
use fanout::plan::{pick, plan};
use fanout::{CallArgs, Fanout, FanoutConfig, TaskArgs, TaskFn, TaskRef, Value};

fn scaled_add() -> TaskRef {
    TaskFn::arc("scaled_add", |args: TaskArgs| {
        Ok(Value::Int(args.int(0, "x")? * 3 + args.int(1, "c")?))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn results_follow_iteration_order(
        xs in prop::collection::vec(-1000i64..1000, 1..40),
        c in -50i64..50,
        workers in 1usize..8,
    ) {
        let par = Fanout::new(scaled_add(), FanoutConfig::default().with_workers(workers)).unwrap();
        let out = par
            .call(CallArgs::new().arg(xs.clone()).arg(c))
            .unwrap()
            .into_raw()
            .unwrap();

        let expected: Vec<Value> = xs.iter().map(|x| Value::Int(x * 3 + c)).collect();
        prop_assert_eq!(out, expected);
    }

    #[test]
    fn inferred_n_is_longest_eligible(
        a in prop::collection::vec(any::<i64>(), 0..20),
        b in prop::collection::vec(any::<i64>(), 0..20),
    ) {
        let plan = plan(
            CallArgs::new().arg(a.clone()).kwarg("b", b.clone()),
            None,
            &InputPolicy::none(),
            false,
        );
        prop_assert_eq!(plan.n(), a.len().max(b.len()).max(1));

        // Every broadcast sequence is either whole or exactly n long
        for seq in plan
            .positional()
            .iter()
            .chain(plan.keyword().iter().map(|(_, seq)| seq))
        {
            prop_assert!(seq.len() == 1 || seq.len() == plan.n());
        }
    }

    #[test]
    fn pick_clamps_to_last(values in prop::collection::vec(any::<i64>(), 1..20), j in 0usize..64) {
        let seq: Vec<Value> = values.iter().map(|&v| Value::Int(v)).collect();
        let expected = Value::Int(values[j.min(values.len() - 1)]);
        prop_assert_eq!(pick(&seq, j), expected);
    }
}
