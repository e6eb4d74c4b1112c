//! Native twins of the Lua procedures, run under the store lock.
//!
//! Each function mirrors its script line for line: same arguments, same
//! arithmetic (f64 like Lua numbers), same reply.

use std::collections::BTreeSet;

use super::Keyspace;
use super::Value;
use super::wrong_type;
use crate::Error;
use crate::Result;
use crate::store::Reply;

type Native = fn(&mut Keyspace, &[String], &[String], u64) -> Result<Reply>;

fn lookup(name: &str) -> Option<Native> {
    let native: Native = match name {
        "fixed_window" => fixed_window,
        "sliding_window" => sliding_window,
        "sliding_window_log" => sliding_window_log,
        "token_bucket" => token_bucket,
        "leaky_bucket" => leaky_bucket,
        "gcra" => gcra,
        _ => return None,
    };
    Some(native)
}

pub(super) fn supports(name: &str) -> bool {
    lookup(name).is_some()
}

pub(super) fn run(
    name: &str,
    keyspace: &mut Keyspace,
    keys: &[String],
    args: &[String],
    now: u64,
) -> Result<Reply> {
    let native = lookup(name)
        .ok_or_else(|| Error::StoreUnavailable(format!("ERR unknown procedure `{name}`")))?;
    native(keyspace, keys, args, now)
}

fn key(keys: &[String], index: usize) -> Result<&str> {
    keys.get(index)
        .map(String::as_str)
        .ok_or_else(|| Error::StoreUnavailable(format!("ERR missing KEYS[{}]", index + 1)))
}

fn number(args: &[String], index: usize) -> Result<f64> {
    let raw = args
        .get(index)
        .ok_or_else(|| Error::StoreUnavailable(format!("ERR missing ARGV[{}]", index + 1)))?;
    raw.parse::<f64>().map_err(|_| {
        Error::StoreUnavailable(format!("ERR ARGV[{}] is not a number: {raw:?}", index + 1))
    })
}

fn millis(value: f64) -> u64 {
    value.max(0.0) as u64
}

fn fixed_window(
    keyspace: &mut Keyspace,
    keys: &[String],
    args: &[String],
    now: u64,
) -> Result<Reply> {
    let counter = key(keys, 0)?;
    let limit = number(args, 0)?;
    let window = millis(number(args, 1)?);

    let current = keyspace.incr(counter, now)?;
    if current == 1 {
        keyspace.pexpire(counter, window, now);
    }

    if current as f64 <= limit {
        return Ok(Reply::Integer(0));
    }

    let mut ttl = keyspace.pttl(counter, now);
    if ttl < 0 {
        keyspace.pexpire(counter, window, now);
        ttl = window as i64;
    }
    Ok(Reply::Integer(ttl.max(1)))
}

fn sliding_window(
    keyspace: &mut Keyspace,
    keys: &[String],
    args: &[String],
    now: u64,
) -> Result<Reply> {
    let current_key = key(keys, 0)?;
    let previous_key = key(keys, 1)?;
    let window_start = number(args, 0)?;
    let window = number(args, 1)?;
    let limit = number(args, 2)?;

    let current = keyspace.incr(current_key, now)?;
    if current == 1 {
        keyspace.pexpire(current_key, millis(window * 2.0), now);
    }
    let previous = match keyspace.get(previous_key, now) {
        Some(Value::Counter(count)) => count,
        Some(_) => return Err(wrong_type(previous_key)),
        None => 0,
    };

    let elapsed = (now as f64 - window_start).clamp(0.0, window);
    let weight = elapsed / window;
    let total = current as f64 + previous as f64 * (1.0 - weight);
    if total > limit {
        let retry = (window - elapsed).max(1.0);
        return Ok(Reply::Integer(retry as i64));
    }
    Ok(Reply::Integer(0))
}

fn sliding_window_log(
    keyspace: &mut Keyspace,
    keys: &[String],
    args: &[String],
    now: u64,
) -> Result<Reply> {
    let log_key = key(keys, 0)?;
    let caller_now = number(args, 0)? as i64;
    let window = number(args, 1)? as i64;
    let limit = number(args, 2)?;
    let member = args
        .get(3)
        .cloned()
        .ok_or_else(|| Error::StoreUnavailable("ERR missing ARGV[4]".to_string()))?;

    let cutoff = caller_now - window;
    let (count, oldest) = match keyspace.get_mut(log_key, now) {
        Some(Value::Log(log)) => {
            while log.first().is_some_and(|(score, _)| *score <= cutoff) {
                log.pop_first();
            }
            (log.len(), log.first().map(|(score, _)| *score))
        }
        Some(_) => return Err(wrong_type(log_key)),
        None => (0, None),
    };
    // an emptied sorted set no longer exists
    if count == 0 {
        keyspace.remove(log_key);
    }

    if (count as f64) < limit {
        if let Some(Value::Log(log)) = keyspace.get_mut(log_key, now) {
            log.insert((caller_now, member));
        } else {
            let log = BTreeSet::from([(caller_now, member)]);
            keyspace.set(log_key, Value::Log(log), None, now);
        }
        keyspace.pexpire(log_key, millis(window as f64), now);
        return Ok(Reply::Array(vec![1, 0]));
    }

    let retry = oldest
        .map(|oldest| oldest + window - caller_now)
        .unwrap_or(window)
        .max(1);
    Ok(Reply::Array(vec![0, retry]))
}

fn token_bucket(
    keyspace: &mut Keyspace,
    keys: &[String],
    args: &[String],
    now: u64,
) -> Result<Reply> {
    let state_key = key(keys, 0)?;
    let capacity = number(args, 0)?;
    let rate = number(args, 1)?;
    let caller_now = number(args, 2)?;

    let (tokens, ts) = match keyspace.get(state_key, now) {
        Some(Value::Bucket { amount, ts }) => (amount, ts),
        Some(_) => return Err(wrong_type(state_key)),
        None => (capacity, caller_now),
    };

    let elapsed = (caller_now - ts).max(0.0);
    let mut tokens = capacity.min(tokens + elapsed * rate);
    let ts = ts.max(caller_now);

    let (admitted, retry) = if tokens >= 1.0 {
        tokens -= 1.0;
        (1, 0)
    } else {
        (0, ((1.0 - tokens) / rate).ceil() as i64)
    };

    let ttl = ((capacity - tokens) / rate).ceil().max(1.0);
    keyspace.set(
        state_key,
        Value::Bucket { amount: tokens, ts },
        Some(millis(ttl)),
        now,
    );
    Ok(Reply::Array(vec![admitted, retry]))
}

fn leaky_bucket(
    keyspace: &mut Keyspace,
    keys: &[String],
    args: &[String],
    now: u64,
) -> Result<Reply> {
    let state_key = key(keys, 0)?;
    let capacity = number(args, 0)?;
    let rate = number(args, 1)?;
    let caller_now = number(args, 2)?;

    let (level, ts) = match keyspace.get(state_key, now) {
        Some(Value::Bucket { amount, ts }) => (amount, ts),
        Some(_) => return Err(wrong_type(state_key)),
        None => (0.0, caller_now),
    };

    let elapsed = (caller_now - ts).max(0.0);
    let mut level = (level - elapsed * rate).max(0.0);
    let ts = ts.max(caller_now);

    let (admitted, retry) = if level < capacity {
        level += 1.0;
        (1, 0)
    } else if rate > 0.0 {
        (0, ((level - capacity + 1.0) / rate).ceil() as i64)
    } else {
        (0, -1)
    };

    let value = Value::Bucket { amount: level, ts };
    if rate > 0.0 {
        let ttl = (level / rate).ceil().max(1.0);
        keyspace.set(state_key, value, Some(millis(ttl)), now);
    } else {
        keyspace.replace(state_key, value, now);
    }
    Ok(Reply::Array(vec![admitted, retry]))
}

fn gcra(keyspace: &mut Keyspace, keys: &[String], args: &[String], now: u64) -> Result<Reply> {
    let tat_key = key(keys, 0)?;
    let burst = number(args, 0)?;
    let period = number(args, 1)?;
    let caller_now = number(args, 2)?;

    let tat = match keyspace.get(tat_key, now) {
        Some(Value::Number(tat)) => tat,
        Some(_) => return Err(wrong_type(tat_key)),
        None => caller_now,
    };
    let tat = tat.max(caller_now);

    let new_tat = tat + period;
    let allow_at = new_tat - burst * period;
    if caller_now < allow_at {
        return Ok(Reply::Array(vec![0, (allow_at - caller_now).ceil() as i64]));
    }

    let ttl = (new_tat - caller_now).ceil().max(1.0);
    keyspace.set(tat_key, Value::Number(new_tat), Some(millis(ttl)), now);
    Ok(Reply::Array(vec![1, 0]))
}
