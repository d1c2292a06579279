use std::collections::HashSet;

use crate::error::Error;
use crate::guard::Ref;
use crate::guard::RefMut;
use crate::guard::TableGuard;
use crate::params::ConstParams;
use crate::params::IdentityParams;
use crate::shard::SHARDS;
use crate::shard::ShardIndex;
use crate::table::Table;

type TestParams = ConstParams<64>;

#[test]
fn test_new() {
  let table: Table<u64, u64, TestParams> = Table::new();

  assert_eq!(table.len(), 0);
  assert!(table.is_empty());
}

#[test]
fn test_put_get() {
  let table: Table<u64, u64, TestParams> = Table::new();

  assert_eq!(table.put(1, 100), None);
  assert_eq!(table.get(&1), Ok(100));
  assert_eq!(table.len(), 1);
}

#[test]
fn test_put_overwrites() {
  let table: Table<u64, u64, TestParams> = Table::new();

  assert_eq!(table.put(1, 100), None);
  assert_eq!(table.put(1, 200), Some(100));
  assert_eq!(table.get(&1), Ok(200));
  assert_eq!(table.len(), 1);
}

#[test]
fn test_get_missing() {
  let table: Table<u64, u64, TestParams> = Table::new();

  assert_eq!(table.get(&1), Err(Error::NotFound));
}

#[test]
fn test_erase_round_trip() {
  let table: Table<u64, u64, TestParams> = Table::new();

  table.put(7, 70);

  assert!(table.erase(&7));
  assert_eq!(table.get(&7), Err(Error::NotFound));
  assert!(!table.erase(&7));
  assert!(table.is_empty());
}

#[test]
fn test_remove_returns_value() {
  let table: Table<u64, String, TestParams> = Table::new();

  table.put(1, "one".to_owned());

  assert_eq!(table.remove(&1), Some("one".to_owned()));
  assert_eq!(table.remove(&1), None);
  assert_eq!(table.len(), 0);
}

#[test]
fn test_contains() {
  let table: Table<String, u64, TestParams> = Table::new();

  table.put("mesh".to_owned(), 1);

  assert!(table.contains("mesh"));
  assert!(!table.contains("material"));
}

#[test]
fn test_try_insert() {
  let table: Table<u64, u64, TestParams> = Table::new();

  assert_eq!(table.try_insert(1, 10), Ok(()));
  assert_eq!(table.try_insert(1, 20), Err(Error::Occupied));
  assert_eq!(table.get(&1), Ok(10));
  assert_eq!(table.len(), 1);
}

#[test]
fn test_get_or_insert_with() {
  let table: Table<u64, u64, TestParams> = Table::new();
  let mut calls: usize = 0;

  let a: u64 = table.get_or_insert_with(1, || {
    calls += 1;
    10
  });

  let b: u64 = table.get_or_insert_with(1, || {
    calls += 1;
    20
  });

  assert_eq!((a, b), (10, 10));
  assert_eq!(calls, 1);
  assert_eq!(table.len(), 1);
}

#[test]
fn test_with() {
  let table: Table<u64, Vec<u8>, TestParams> = Table::new();

  table.put(1, vec![1, 2, 3]);

  assert_eq!(table.with(&1, Vec::len), Ok(3));
  assert_eq!(table.with(&2, Vec::len), Err(Error::NotFound));
}

#[test]
fn test_with_mut() {
  let table: Table<u64, Vec<u8>, TestParams> = Table::new();

  table.put(1, vec![1]);

  assert_eq!(table.with_mut(&1, |value| value.push(2)), Ok(()));
  assert_eq!(table.get(&1), Ok(vec![1, 2]));
  assert_eq!(table.with_mut(&2, |value| value.push(2)), Err(Error::NotFound));
}

#[test]
fn test_with_releases_shard() {
  let table: Table<u64, u64, IdentityParams> = Table::new();

  table.put(3, 3);
  table.with(&3, |_| ()).unwrap();
  table.with_mut(&3, |_| ()).unwrap();

  assert!(table.try_lock_all().is_some());
}

#[test]
fn test_read_guard() {
  let table: Table<u64, u64, IdentityParams> = Table::new();

  table.put(3, 30);

  let value: Ref<'_, u64> = table.read(&3).unwrap();

  assert_eq!(*value, 30);

  // Other readers of the shard proceed, writers and lock-all do not.
  assert_eq!(table.get(&3), Ok(30));
  assert!(table.try_lock_all().is_none());

  drop(value);

  assert!(table.try_lock_all().is_some());
  assert!(matches!(table.read(&4), Err(Error::NotFound)));
}

#[test]
fn test_write_guard() {
  let table: Table<u64, u64, IdentityParams> = Table::new();

  table.put(3, 30);

  {
    let mut value: RefMut<'_, u64> = table.write(&3).unwrap();

    *value += 1;

    // Other shards stay available.
    assert_eq!(table.put(4, 40), None);
    assert!(table.try_lock_all().is_none());
  }

  assert_eq!(table.get(&3), Ok(31));
  assert!(matches!(table.write(&5), Err(Error::NotFound)));
}

#[test]
fn test_shard_of_is_stable() {
  let table: Table<String, u64, TestParams> = Table::new();
  let index: ShardIndex = table.shard_of("texture");

  for _ in 0..100 {
    assert_eq!(table.shard_of("texture"), index);
  }
}

#[test]
fn test_shard_len() {
  let table: Table<u64, u64, IdentityParams> = Table::new();

  for key in 0..(SHARDS as u64 * 4) {
    table.put(key, key);
  }

  for index in ShardIndex::all() {
    assert_eq!(table.shard_len(index), 4);
  }
}

#[test]
fn test_every_shard_reachable() {
  let table: Table<u64, u64, TestParams> = Table::new();
  let reached: HashSet<ShardIndex> = (0..1_000_u64).map(|key| table.shard_of(&key)).collect();

  assert_eq!(reached.len(), SHARDS);
}

#[test]
fn test_for_each_visits_everything() {
  let table: Table<u64, u64, TestParams> = Table::new();

  for key in 0..100 {
    table.put(key, key * 2);
  }

  let mut seen: HashSet<u64> = HashSet::new();

  table.for_each(|key, value| {
    assert_eq!(*value, key * 2);
    assert!(seen.insert(*key));
  });

  assert_eq!(seen.len(), 100);
}

#[test]
fn test_for_each_ascending_shards() {
  let table: Table<u64, u64, IdentityParams> = Table::new();

  for key in (0..SHARDS as u64).rev() {
    table.put(key, key);
  }

  let mut order: Vec<u64> = Vec::new();

  table.for_each(|key, _| order.push(*key));

  assert_eq!(order, (0..SHARDS as u64).collect::<Vec<_>>());
}

#[test]
fn test_snapshot_and_keys() {
  let table: Table<u64, char, TestParams> = Table::new();

  table.put(1, 'a');
  table.put(2, 'b');
  table.put(3, 'c');

  let mut entries: Vec<(u64, char)> = table.snapshot();
  let mut keys: Vec<u64> = table.keys();

  entries.sort_unstable();
  keys.sort_unstable();

  assert_eq!(entries, [(1, 'a'), (2, 'b'), (3, 'c')]);
  assert_eq!(keys, [1, 2, 3]);
  assert!(table.try_lock_all().is_some());
}

#[test]
fn test_retain() {
  let table: Table<u64, u64, TestParams> = Table::new();

  for key in 0..20 {
    table.put(key, key);
  }

  assert_eq!(table.retain(|key, value| {
    *value += 1;
    key % 4 == 0
  }), 15);

  assert_eq!(table.len(), 5);
  assert_eq!(table.get(&8), Ok(9));
  assert_eq!(table.get(&9), Err(Error::NotFound));
}

#[test]
fn test_clear() {
  let table: Table<u64, u64, TestParams> = Table::new();

  for key in 0..20 {
    table.put(key, key);
  }

  table.clear();

  assert!(table.is_empty());
  assert_eq!(table.get(&0), Err(Error::NotFound));
}

#[test]
fn test_reserve() {
  let table: Table<u64, u64, TestParams> = Table::new();

  table.reserve(1024);
  table.put(1, 1);

  assert_eq!(table.len(), 1);
}

#[test]
fn test_guard_mutation() {
  let table: Table<u64, u64, TestParams> = Table::new();

  table.put(1, 10);

  {
    let mut guard: TableGuard<'_, u64, u64, TestParams> = table.lock_all();

    assert_eq!(guard.len(), 1);
    assert_eq!(guard.get(&1), Some(&10));
    assert!(guard.contains_key(&1));

    *guard.get_mut(&1).unwrap() = 11;

    assert_eq!(guard.insert(2, 20), None);
    assert_eq!(guard.insert(2, 21), Some(20));
    assert_eq!(guard.remove(&1), Some(11));
    assert_eq!(guard.remove(&1), None);

    for (_, value) in guard.iter_mut() {
      *value *= 2;
    }

    assert_eq!(guard.iter().collect::<Vec<_>>(), [(&2, &42)]);
    assert_eq!(guard.keys().copied().collect::<Vec<_>>(), [2]);
    assert_eq!(guard.values().copied().collect::<Vec<_>>(), [42]);

    guard.unlock();
  }

  assert_eq!(table.len(), 1);
  assert_eq!(table.get(&2), Ok(42));
}

#[test]
fn test_guard_counts() {
  let table: Table<u64, u64, IdentityParams> = Table::new();
  let mut guard: TableGuard<'_, u64, u64, IdentityParams> = table.lock_all();

  assert!(guard.is_empty());

  for key in 0..32 {
    guard.insert(key, key);
  }

  assert_eq!(guard.len(), 32);
  assert_eq!(guard.shard_len(ShardIndex::from_hash(5)), 2);
  assert_eq!(guard.retain(|key, _| *key < 16), 16);

  guard.reserve(100);
  guard.clear();

  assert!(guard.is_empty());

  drop(guard);

  assert!(table.is_empty());
}

#[test]
fn test_guard_excludes_point_operations() {
  let table: Table<u64, u64, TestParams> = Table::new();
  let guard: TableGuard<'_, u64, u64, TestParams> = table.lock_all();

  assert!(table.try_lock_all().is_none());

  drop(guard);

  assert!(table.try_lock_all().is_some());
}

#[test]
fn test_debug() {
  let table: Table<u64, u64, IdentityParams> = Table::new();

  table.put(1, 2);

  assert_eq!(format!("{table:?}"), "{1: 2}");

  let guard: Ref<'_, u64> = table.read(&1).unwrap();

  assert_eq!(format!("{table:?}"), "<locked>");
  assert_eq!(format!("{guard:?}"), "2");
}

#[test]
fn test_drops_values() {
  use std::rc::Rc;

  let value: Rc<()> = Rc::new(());

  {
    let table: Table<u64, Rc<()>, TestParams> = Table::new();

    for key in 0..10 {
      table.put(key, Rc::clone(&value));
    }

    assert_eq!(Rc::strong_count(&value), 11);
    assert!(table.erase(&0));
    assert_eq!(Rc::strong_count(&value), 10);
  }

  assert_eq!(Rc::strong_count(&value), 1);
}

#[test]
fn test_retain_panic_keeps_count() {
  use std::panic;
  use std::panic::AssertUnwindSafe;

  let table: Table<u64, u64, IdentityParams> = Table::new();

  for key in 0..32 {
    table.put(key, key);
  }

  let mut seen: usize = 0;

  let result = panic::catch_unwind(AssertUnwindSafe(|| {
    table.retain(|key, _| {
      seen += 1;

      assert!(seen < 20, "retain interrupted");

      key % 2 == 0
    })
  }));

  assert!(result.is_err());
  assert!(table.try_lock_all().is_some());

  let exact: usize = table.lock_all().len();

  assert!(exact < 32);
  assert_eq!(table.len(), exact);
}

#[test]
fn test_drain() {
  let table: Table<u64, u64, IdentityParams> = Table::new();

  for key in 0..20 {
    table.put(key, key * 10);
  }

  let mut guard: TableGuard<'_, u64, u64, IdentityParams> = table.lock_all();
  let drained: Vec<(u64, u64)> = guard.drain();

  assert!(guard.is_empty());
  assert_eq!(drained.len(), 20);
  assert!(drained.iter().all(|(key, value)| *value == key * 10));

  // Ascending shard order.
  let shards: Vec<ShardIndex> = drained.iter().map(|(key, _)| table.shard_of(key)).collect();
  assert!(shards.is_sorted());

  guard.extend(drained);

  assert_eq!(guard.len(), 20);

  drop(guard);

  assert_eq!(table.len(), 20);
}

#[test]
fn test_swap() {
  let a: Table<u64, char, TestParams> = Table::new();
  let b: Table<u64, char, TestParams> = Table::new();

  a.put(1, 'a');
  b.put(2, 'b');
  b.put(3, 'b');

  a.swap(&b);

  assert_eq!(a.len(), 2);
  assert_eq!(b.len(), 1);
  assert_eq!(a.get(&2), Ok('b'));
  assert_eq!(a.get(&3), Ok('b'));
  assert_eq!(a.get(&1), Err(Error::NotFound));
  assert_eq!(b.get(&1), Ok('a'));
  assert!(a.try_lock_all().is_some());
  assert!(b.try_lock_all().is_some());
}

#[test]
fn test_swap_reroutes_entries() {
  let a: Table<u64, u64, TestParams> = Table::new();
  let b: Table<u64, u64, TestParams> = Table::new();

  for key in 0..200 {
    a.put(key, key);
  }

  a.swap(&b);

  assert!(a.is_empty());
  assert_eq!(b.len(), 200);

  for key in 0..200 {
    assert_eq!(b.get(&key), Ok(key), "key {key}");
  }

  let guard: TableGuard<'_, u64, u64, TestParams> = b.lock_all();

  for index in ShardIndex::all() {
    let expected: usize = (0..200).filter(|key| b.shard_of(key) == index).count();
    assert_eq!(guard.shard_len(index), expected, "shard {index}");
  }
}

#[test]
fn test_swap_with_self() {
  let table: Table<u64, u64, TestParams> = Table::new();

  table.put(1, 1);
  table.swap(&table);

  assert_eq!(table.get(&1), Ok(1));
  assert_eq!(table.take_from(&table), 0);
  assert_eq!(table.len(), 1);
}

#[test]
fn test_take_from() {
  use std::rc::Rc;

  let value: Rc<()> = Rc::new(());
  let live: Table<u64, Rc<()>, TestParams> = Table::new();
  let staged: Table<u64, Rc<()>, TestParams> = Table::new();

  live.put(0, Rc::clone(&value));
  live.put(1, Rc::clone(&value));
  staged.put(2, Rc::clone(&value));

  assert_eq!(live.take_from(&staged), 2);
  assert_eq!(Rc::strong_count(&value), 2);

  assert!(staged.is_empty());
  assert_eq!(live.len(), 1);
  assert!(live.contains(&2));
  assert!(!live.contains(&0));
}
