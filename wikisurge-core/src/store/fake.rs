//! In-process fake backend for [`super::Store`], used throughout this
//! crate's test suite to drive detectors, the analysis cache, and the
//! digest collector end-to-end without a live Redis. Keys share a single
//! namespace regardless of value type, matching real Redis semantics, so
//! `expire`/`exists`/`delete` don't need to know what kind of value a key
//! holds.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use regex::Regex;

#[derive(Clone, Debug)]
enum Value {
    Str(String),
    Set(HashSet<String>),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
    ZSet(Vec<(String, f64)>),
    Stream(Vec<StreamEntry>),
}

#[derive(Clone, Debug)]
struct StreamEntry {
    id_ms: i64,
    id_seq: u64,
    fields: Vec<(String, String)>,
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct State {
    keys: HashMap<String, Entry>,
}

/// An in-memory, TTL-aware stand-in for a Redis connection. Cheaply
/// cloneable (shares one `Mutex`-guarded map), matching `Store`'s own
/// cloning contract.
#[derive(Clone)]
pub struct FakeStore {
    state: Arc<Mutex<State>>,
    stream_seq: Arc<AtomicU64>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            stream_seq: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Default for FakeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    fn purge_if_expired(&mut self, key: &str) {
        let expired = self
            .keys
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| Instant::now() >= at);
        if expired {
            self.keys.remove(key);
        }
    }

    fn get(&mut self, key: &str) -> Option<&Value> {
        self.purge_if_expired(key);
        self.keys.get(key).map(|e| &e.value)
    }

    fn get_mut_or_insert(&mut self, key: &str, default: Value) -> &mut Value {
        self.purge_if_expired(key);
        &mut self
            .keys
            .entry(key.to_string())
            .or_insert(Entry { value: default, expires_at: None })
            .value
    }

    fn set_ttl(&mut self, key: &str, ttl: Duration) {
        if let Some(entry) = self.keys.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
    }
}

impl FakeStore {
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.state.lock().get(key) {
            Some(Value::Str(s)) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn set_string(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let mut state = self.state.lock();
        state.keys.insert(
            key.to_string(),
            Entry { value: Value::Str(value.to_string()), expires_at: ttl.map(|t| Instant::now() + t) },
        );
    }

    pub fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> bool {
        let mut state = self.state.lock();
        state.purge_if_expired(key);
        if state.keys.contains_key(key) {
            return false;
        }
        state.keys.insert(
            key.to_string(),
            Entry { value: Value::Str(value.to_string()), expires_at: Some(Instant::now() + ttl) },
        );
        true
    }

    pub fn exists(&self, key: &str) -> bool {
        self.state.lock().get(key).is_some()
    }

    pub fn expire(&self, key: &str, ttl: Duration) {
        self.state.lock().set_ttl(key, ttl);
    }

    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let mut state = self.state.lock();
        state.purge_if_expired(key);
        state.keys.get(key)?.expires_at.map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn delete(&self, key: &str) {
        self.state.lock().keys.remove(key);
    }

    pub fn scan_match(&self, pattern: &str) -> Vec<String> {
        let escaped = regex::escape(pattern).replace(r"\*", ".*");
        let re = Regex::new(&format!("^{escaped}$")).expect("glob pattern compiles");
        let mut state = self.state.lock();
        let keys: Vec<String> = state.keys.keys().cloned().collect();
        keys.into_iter()
            .filter(|k| {
                state.purge_if_expired(k);
                state.keys.contains_key(k) && re.is_match(k)
            })
            .collect()
    }

    // -- sets -----------------------------------------------------------------

    pub fn scard(&self, key: &str) -> u64 {
        match self.state.lock().get(key) {
            Some(Value::Set(s)) => s.len() as u64,
            _ => 0,
        }
    }

    pub fn sadd_bounded(&self, key: &str, member: &str, max_members: usize, ttl: Duration) -> u64 {
        let mut state = self.state.lock();
        let value = state.get_mut_or_insert(key, Value::Set(HashSet::new()));
        let Value::Set(set) = value else { unreachable!("sadd_bounded on non-set key") };
        if set.contains(member) || set.len() < max_members {
            set.insert(member.to_string());
        }
        let len = set.len() as u64;
        state.set_ttl(key, ttl);
        len
    }

    pub fn sadd(&self, key: &str, member: &str) {
        let mut state = self.state.lock();
        let value = state.get_mut_or_insert(key, Value::Set(HashSet::new()));
        let Value::Set(set) = value else { unreachable!("sadd on non-set key") };
        set.insert(member.to_string());
    }

    pub fn srem(&self, key: &str, member: &str) {
        let mut state = self.state.lock();
        state.purge_if_expired(key);
        if let Some(Value::Set(set)) = state.keys.get_mut(key).map(|e| &mut e.value) {
            set.remove(member);
        }
    }

    pub fn smembers(&self, key: &str) -> Vec<String> {
        match self.state.lock().get(key) {
            Some(Value::Set(s)) => s.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    // -- hashes ---------------------------------------------------------------

    pub fn hset_many(&self, key: &str, fields: &[(&str, String)], ttl: Duration) {
        let mut state = self.state.lock();
        let value = state.get_mut_or_insert(key, Value::Hash(HashMap::new()));
        let Value::Hash(hash) = value else { unreachable!("hset_many on non-hash key") };
        for (field, v) in fields {
            hash.insert(field.to_string(), v.clone());
        }
        state.set_ttl(key, ttl);
    }

    pub fn incr(&self, key: &str, delta: i64, ttl: Duration) -> i64 {
        let mut state = self.state.lock();
        let value = state.get_mut_or_insert(key, Value::Str("0".to_string()));
        let Value::Str(s) = value else { unreachable!("incr on non-string key") };
        let current: i64 = s.parse().unwrap_or(0);
        let next = current + delta;
        *s = next.to_string();
        state.set_ttl(key, ttl);
        next
    }

    pub fn hincrby(&self, key: &str, field: &str, delta: i64, ttl: Duration) -> i64 {
        let mut state = self.state.lock();
        let value = state.get_mut_or_insert(key, Value::Hash(HashMap::new()));
        let Value::Hash(hash) = value else { unreachable!("hincrby on non-hash key") };
        let current: i64 = hash.get(field).and_then(|v| v.parse().ok()).unwrap_or(0);
        let next = current + delta;
        hash.insert(field.to_string(), next.to_string());
        state.set_ttl(key, ttl);
        next
    }

    pub fn hgetall(&self, key: &str) -> HashMap<String, String> {
        match self.state.lock().get(key) {
            Some(Value::Hash(h)) => h.clone(),
            _ => HashMap::new(),
        }
    }

    pub fn hlen(&self, key: &str) -> u64 {
        match self.state.lock().get(key) {
            Some(Value::Hash(h)) => h.len() as u64,
            _ => 0,
        }
    }

    // -- lists ------------------------------------------------------------------

    pub fn lpush_trim(&self, key: &str, value: &str, max_len: isize, ttl: Duration) {
        let mut state = self.state.lock();
        let entry = state.get_mut_or_insert(key, Value::List(VecDeque::new()));
        let Value::List(list) = entry else { unreachable!("lpush_trim on non-list key") };
        list.push_front(value.to_string());
        let max_len = max_len.max(0) as usize;
        list.truncate(max_len);
        state.set_ttl(key, ttl);
    }

    pub fn lrange_all(&self, key: &str) -> Vec<String> {
        match self.state.lock().get(key) {
            Some(Value::List(list)) => list.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub fn llen(&self, key: &str) -> u64 {
        match self.state.lock().get(key) {
            Some(Value::List(list)) => list.len() as u64,
            _ => 0,
        }
    }

    // -- sorted sets --------------------------------------------------------

    pub fn zadd(&self, key: &str, member: &str, score: f64) {
        let mut state = self.state.lock();
        let value = state.get_mut_or_insert(key, Value::ZSet(Vec::new()));
        let Value::ZSet(set) = value else { unreachable!("zadd on non-zset key") };
        if let Some(existing) = set.iter_mut().find(|(m, _)| m == member) {
            existing.1 = score;
        } else {
            set.push((member.to_string(), score));
        }
    }

    pub fn zscore(&self, key: &str, member: &str) -> Option<f64> {
        match self.state.lock().get(key) {
            Some(Value::ZSet(set)) => set.iter().find(|(m, _)| m == member).map(|(_, s)| *s),
            _ => None,
        }
    }

    pub fn zrem(&self, key: &str, member: &str) {
        let mut state = self.state.lock();
        if let Some(Value::ZSet(set)) = state.keys.get_mut(key).map(|e| &mut e.value) {
            set.retain(|(m, _)| m != member);
        }
    }

    pub fn zremrangebyscore(&self, key: &str, min: f64, max: f64) {
        let mut state = self.state.lock();
        if let Some(Value::ZSet(set)) = state.keys.get_mut(key).map(|e| &mut e.value) {
            set.retain(|(_, score)| !(*score >= min && *score <= max));
        }
    }

    pub fn zcard(&self, key: &str) -> u64 {
        match self.state.lock().get(key) {
            Some(Value::ZSet(set)) => set.len() as u64,
            _ => 0,
        }
    }

    pub fn zcount(&self, key: &str, min: f64, max: f64) -> u64 {
        match self.state.lock().get(key) {
            Some(Value::ZSet(set)) => {
                set.iter().filter(|(_, score)| *score >= min && *score <= max).count() as u64
            }
            _ => 0,
        }
    }

    /// Descending rank (0 = highest score), matching `ZREVRANK`.
    pub fn zrevrank(&self, key: &str, member: &str) -> Option<u64> {
        match self.state.lock().get(key) {
            Some(Value::ZSet(set)) => {
                let mut sorted = set.clone();
                sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
                sorted.iter().position(|(m, _)| m == member).map(|p| p as u64)
            }
            _ => None,
        }
    }

    pub fn zrevrange_withscores(&self, key: &str, n: isize) -> Vec<(String, f64)> {
        match self.state.lock().get(key) {
            Some(Value::ZSet(set)) => {
                let mut sorted = set.clone();
                sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
                let take = if n < 0 { sorted.len() } else { n as usize };
                sorted.into_iter().take(take).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn zremrangebyrank_keep_top(&self, key: &str, max_entries: isize) {
        let mut state = self.state.lock();
        if let Some(Value::ZSet(set)) = state.keys.get_mut(key).map(|e| &mut e.value) {
            set.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            let keep = max_entries.max(0) as usize;
            set.truncate(keep);
        }
    }

    // -- streams --------------------------------------------------------------

    pub fn xadd_bounded(&self, stream: &str, fields: &[(&str, String)], maxlen: usize) -> String {
        let mut state = self.state.lock();
        let value = state.get_mut_or_insert(stream, Value::Stream(Vec::new()));
        let Value::Stream(entries) = value else { unreachable!("xadd on non-stream key") };

        let id_ms = now_ms();
        let id_seq = self.stream_seq.fetch_add(1, Ordering::Relaxed);
        entries.push(StreamEntry {
            id_ms,
            id_seq,
            fields: fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        });
        if entries.len() > maxlen {
            let drop = entries.len() - maxlen;
            entries.drain(0..drop);
        }
        format!("{id_ms}-{id_seq}")
    }

    pub fn xlen(&self, stream: &str) -> u64 {
        match self.state.lock().get(stream) {
            Some(Value::Stream(entries)) => entries.len() as u64,
            _ => 0,
        }
    }

    pub fn xrange_since(&self, stream: &str, since_ms: i64) -> Vec<HashMap<String, String>> {
        match self.state.lock().get(stream) {
            Some(Value::Stream(entries)) => entries
                .iter()
                .filter(|e| e.id_ms >= since_ms)
                .map(|e| e.fields.iter().cloned().collect::<HashMap<String, String>>())
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn publish(&self, _channel: &str, _message: &str) {
        // No in-process subscribers in tests; the fake backend is a no-op
        // sink for pub/sub, matching "no subscribers" being the common
        // case in production too.
    }
}

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_roundtrip_with_ttl() {
        let fake = FakeStore::new();
        fake.set_string("k", "v", Some(Duration::from_secs(60)));
        assert_eq!(fake.get_string("k"), Some("v".to_string()));
        assert!(fake.ttl_remaining("k").unwrap() <= Duration::from_secs(60));
    }

    #[test]
    fn set_nx_only_creates_once() {
        let fake = FakeStore::new();
        assert!(fake.set_nx("k", "first", Duration::from_secs(60)));
        assert!(!fake.set_nx("k", "second", Duration::from_secs(60)));
        assert_eq!(fake.get_string("k"), Some("first".to_string()));
    }

    #[test]
    fn sadd_bounded_rejects_past_cap() {
        let fake = FakeStore::new();
        for i in 0..5 {
            fake.sadd_bounded("s", &format!("m{i}"), 3, Duration::from_secs(60));
        }
        assert_eq!(fake.scard("s"), 3);
    }

    #[test]
    fn lpush_trim_keeps_newest_at_front() {
        let fake = FakeStore::new();
        fake.lpush_trim("l", "a", 2, Duration::from_secs(60));
        fake.lpush_trim("l", "b", 2, Duration::from_secs(60));
        fake.lpush_trim("l", "c", 2, Duration::from_secs(60));
        assert_eq!(fake.lrange_all("l"), vec!["c".to_string(), "b".to_string()]);
    }

    #[test]
    fn zset_rank_is_descending() {
        let fake = FakeStore::new();
        fake.zadd("z", "low", 1.0);
        fake.zadd("z", "high", 10.0);
        assert_eq!(fake.zrevrank("z", "high"), Some(0));
        assert_eq!(fake.zrevrank("z", "low"), Some(1));
    }

    #[test]
    fn stream_trims_to_maxlen() {
        let fake = FakeStore::new();
        for i in 0..5 {
            fake.xadd_bounded("s", &[("data", i.to_string())], 3);
        }
        assert_eq!(fake.xlen("s"), 3);
    }

    #[test]
    fn expired_key_disappears() {
        let fake = FakeStore::new();
        fake.set_string("k", "v", Some(Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(20));
        assert!(!fake.exists("k"));
    }
}
