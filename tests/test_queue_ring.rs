// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
// 结果队列与环形缓冲的随机序列测试

use flowwarp_rs::pipeline::{nearest_timestamp, FlowResult, FlowResultQueue, FrameRing};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn queue_matches_sorted_model_under_random_operations() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let capacity = rng.gen_range(1..=10);
        let queue = FlowResultQueue::new(capacity);
        let mut model: Vec<u64> = Vec::new();

        for _ in 0..200 {
            if rng.gen_bool(0.7) {
                let ts = rng.gen_range(0..1_000u64);
                let evicted = queue.push(FlowResult::new(ts, vec![ts as f32]));
                model.push(ts);
                model.sort_unstable();
                if model.len() > capacity {
                    let smallest = model.remove(0);
                    assert_eq!(evicted.map(|r| r.timestamp), Some(smallest));
                } else {
                    assert!(evicted.is_none());
                }
            } else {
                let taken = queue.try_take();
                if model.is_empty() {
                    assert!(taken.is_none());
                } else {
                    let expected = model.remove(0);
                    let result = taken.unwrap();
                    assert_eq!(result.timestamp, expected);
                    assert_eq!(result.vertices, vec![expected as f32]);
                }
            }
            assert!(queue.len() <= capacity);
            assert_eq!(queue.timestamps(), model);
        }
    }
}

#[test]
fn ring_keeps_the_most_recent_frames() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..30 {
        let size = rng.gen_range(1..=12);
        let writes = size + rng.gen_range(1..40);
        let mut ring = FrameRing::from_fn(size, |i| Ok(i)).unwrap();

        let mut written = Vec::new();
        let mut ts = 0u64;
        for k in 0..writes {
            ts += rng.gen_range(1..1_000);
            let (index, target) = ring.write_target();
            assert_eq!(index, k % size);
            assert_eq!(*target, index);
            ring.commit(ts);
            ring.advance();
            written.push(ts);
        }

        for (k, &ts) in written.iter().enumerate().skip(writes - size) {
            assert_eq!(ring.slot(k % size).timestamp, ts);
        }
        assert_eq!(ring.write_index(), writes % size);
    }
}

#[test]
fn nearest_matches_brute_force() {
    let mut rng = StdRng::seed_from_u64(13);
    for _ in 0..500 {
        let n = rng.gen_range(1..10);
        let slots: Vec<u64> = (0..n).map(|_| rng.gen_range(0..10_000)).collect();
        let query = rng.gen_range(0..10_000u64);

        let found = nearest_timestamp(slots.iter().copied(), query);
        let best = slots.iter().map(|&s| s.abs_diff(query)).min().unwrap();
        // 基准 |query| 可能比所有槽位都近, 此时保持下标 0
        if best < query {
            assert_eq!(slots[found].abs_diff(query), best);
            let first = slots.iter().position(|&s| s.abs_diff(query) == best).unwrap();
            assert_eq!(found, first);
        } else {
            assert_eq!(found, 0);
        }
    }
}
