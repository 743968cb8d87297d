//! 回调上下文注册表的属性测试

use std::collections::{HashMap, HashSet};

use clamav_binding::clamav::ContextRegistry;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Register(u32),
    Unregister(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<u32>().prop_map(Op::Register),
        any::<usize>().prop_map(Op::Unregister),
    ]
}

proptest! {
    /// 注册的值总能解析回自身
    #[test]
    fn resolve_returns_registered_value(values in prop::collection::vec(any::<u64>(), 1..50)) {
        let registry = ContextRegistry::new();
        let keys: Vec<_> = values.iter().map(|v| registry.register(*v)).collect();

        for (key, value) in keys.iter().zip(&values) {
            prop_assert_eq!(registry.resolve(*key), *value);
        }
        prop_assert_eq!(registry.len(), values.len());
    }

    /// 相同的值也会得到不同的 key
    #[test]
    fn equal_values_get_distinct_keys(value in any::<i32>(), n in 2..30usize) {
        let registry = ContextRegistry::new();
        let keys: HashSet<_> = (0..n).map(|_| registry.register(value)).collect();
        prop_assert_eq!(keys.len(), n);
    }

    /// 存活集合恰好等于已注册减去已注销
    #[test]
    fn live_set_tracks_operations(ops in prop::collection::vec(op(), 1..100)) {
        let registry = ContextRegistry::new();
        let mut model = HashMap::new();
        let mut issued = HashSet::new();

        for op in ops {
            match op {
                Op::Register(value) => {
                    let key = registry.register(value);
                    prop_assert!(issued.insert(key), "key 被重复发放");
                    model.insert(key, value);
                }
                Op::Unregister(pick) => {
                    if model.is_empty() {
                        continue;
                    }
                    let mut live: Vec<_> = model.keys().copied().collect();
                    live.sort_by_key(|k| k.id());
                    let key = live[pick % live.len()];
                    let expected = model.remove(&key).unwrap();
                    prop_assert_eq!(registry.unregister(key), expected);
                }
            }

            prop_assert_eq!(registry.len(), model.len());
            for (key, value) in &model {
                prop_assert!(registry.contains(*key));
                prop_assert_eq!(registry.resolve(*key), *value);
            }
        }

        for key in &issued {
            prop_assert_eq!(registry.contains(*key), model.contains_key(key));
        }
    }
}
