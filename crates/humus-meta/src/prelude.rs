//! Built-in functions and service actors
//!
//! Native functions take their arguments as one value, usually a pair, and
//! answer `?` (with a warning) when the argument has the wrong shape.
//! Services are ordinary behaviors on the configuration; Humus code talks
//! to them with `SEND`.

use crate::Value;
use humus_core::{Behavior, Context, SeededRng};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

fn ill_typed(name: &str, arg: &Value) -> Value {
    tracing::warn!(native = name, %arg, "ill-typed argument");
    Value::Undefined
}

fn numbers(arg: &Value) -> Option<(i64, i64)> {
    let (a, b) = arg.as_pair()?;
    Some((a.as_number()?, b.as_number()?))
}

fn arithmetic(name: &'static str, op: fn(i64, i64) -> Option<i64>) -> Value {
    Value::native(name, move |arg| {
        match numbers(arg).and_then(|(a, b)| op(a, b)) {
            Some(n) => Value::Number(n),
            None => ill_typed(name, arg),
        }
    })
}

/// Division rounding toward negative infinity
fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

fn compare(arg: &Value) -> Option<Ordering> {
    let (a, b) = arg.as_pair()?;
    if a == b {
        return Some(Ordering::Equal);
    }
    Some(a.as_number()?.cmp(&b.as_number()?))
}

fn comparison(name: &'static str, test: fn(Ordering) -> bool) -> Value {
    Value::native(name, move |arg| match compare(arg) {
        Some(ord) => Value::Bool(test(ord)),
        None => ill_typed(name, arg),
    })
}

/// Value of a digit, given as a character code or as a plain number
fn base_digit(base: i64, digit: i64) -> Option<i64> {
    if !(2..=36).contains(&base) {
        return None;
    }
    let value = match u8::try_from(digit).ok() {
        Some(c @ b'0'..=b'9') => i64::from(c - b'0'),
        Some(c @ b'A'..=b'Z') => i64::from(c - b'A') + 10,
        Some(c @ b'a'..=b'z') => i64::from(c - b'a') + 10,
        _ => digit,
    };
    (0..base).contains(&value).then_some(value)
}

/// `(base, d1, d2, ...)` to a number; the digit list may end in `NIL` or in
/// a final digit
fn tuple_to_number(arg: &Value) -> Option<i64> {
    let (base, mut digits) = arg.as_pair()?;
    let base = base.as_number()?;
    let mut n: i64 = 0;
    loop {
        let digit = match digits {
            Value::Nil => return Some(n),
            Value::Pair(p) => {
                let d = p.head.as_number()?;
                digits = &p.tail;
                d
            }
            Value::Number(d) => {
                let digit = base_digit(base, *d)?;
                return n.checked_mul(base)?.checked_add(digit);
            }
            _ => return None,
        };
        let digit = base_digit(base, digit)?;
        n = n.checked_mul(base)?.checked_add(digit)?;
    }
}

/// Character codes to a symbol, in the same list shape as `tuple_to_number`
fn tuple_to_symbol(arg: &Value) -> Option<Value> {
    let mut name = String::new();
    let mut rest = arg;
    loop {
        let code = match rest {
            Value::Nil => return Some(Value::symbol(&name)),
            Value::Pair(p) => {
                let code = p.head.as_number()?;
                rest = &p.tail;
                code
            }
            Value::Number(code) => {
                name.push(char::from_u32(u32::try_from(*code).ok()?)?);
                return Some(Value::symbol(&name));
            }
            _ => return None,
        };
        name.push(char::from_u32(u32::try_from(code).ok()?)?);
    }
}

/// `(ranges, token)`: whether `token` equals an element of `ranges` or falls
/// inside one of its `(lo, hi)` pairs
fn in_range_set(arg: &Value) -> Option<bool> {
    let (mut set, token) = arg.as_pair()?;
    let n = token.as_number()?;
    while let Value::Pair(p) = set {
        match p.head.as_pair() {
            Some((lo, hi)) => {
                if let (Some(lo), Some(hi)) = (lo.as_number(), hi.as_number()) {
                    if lo <= n && n <= hi {
                        return Some(true);
                    }
                }
            }
            None => {
                if p.head == *token {
                    return Some(true);
                }
            }
        }
        set = &p.tail;
    }
    matches!(set, Value::Nil).then_some(false)
}

/// `map_empty`: the map with no keys
fn map_empty() -> Value {
    Value::native("map_empty", |_| Value::Undefined)
}

/// `map_bind((map, key, value))`: a map answering `value` for `key` and
/// deferring to `map` otherwise
fn map_bind(arg: &Value) -> Option<Value> {
    let (map, rest) = arg.as_pair()?;
    let (key, value) = rest.as_pair()?;
    let Value::Native(inner) = map else {
        return None;
    };
    let (inner, key, value) = (inner.clone(), key.clone(), value.clone());
    Some(Value::native("map", move |lookup| {
        if *lookup == key {
            value.clone()
        } else {
            inner.call(lookup)
        }
    }))
}

/// Native functions defined in every global environment
pub fn natives() -> Vec<(&'static str, Value)> {
    vec![
        ("add", arithmetic("add", i64::checked_add)),
        ("sub", arithmetic("sub", i64::checked_sub)),
        ("mul", arithmetic("mul", i64::checked_mul)),
        ("div", arithmetic("div", floor_div)),
        (
            "neg",
            Value::native("neg", |arg| match arg.as_number().and_then(i64::checked_neg) {
                Some(n) => Value::Number(n),
                None => ill_typed("neg", arg),
            }),
        ),
        (
            "eq",
            Value::native("eq", |arg| match arg.as_pair() {
                Some((a, b)) => Value::Bool(a == b),
                None => Value::Undefined,
            }),
        ),
        (
            "compare",
            Value::native("compare", |arg| match compare(arg) {
                Some(ord) => Value::Number(ord as i64),
                None => ill_typed("compare", arg),
            }),
        ),
        ("less", comparison("less", Ordering::is_lt)),
        ("less_equal", comparison("less_equal", Ordering::is_le)),
        ("greater", comparison("greater", Ordering::is_gt)),
        ("greater_equal", comparison("greater_equal", Ordering::is_ge)),
        (
            "not",
            Value::native("not", |arg| match arg.as_bool() {
                Some(b) => Value::Bool(!b),
                None => ill_typed("not", arg),
            }),
        ),
        (
            "and",
            Value::native("and", |arg| {
                let pair = arg.as_pair().map(|(a, b)| (a.as_bool(), b.as_bool()));
                match pair {
                    Some((Some(false), _)) | Some((_, Some(false))) => Value::FALSE,
                    Some((Some(true), Some(true))) => Value::TRUE,
                    _ => ill_typed("and", arg),
                }
            }),
        ),
        (
            "or",
            Value::native("or", |arg| {
                let pair = arg.as_pair().map(|(a, b)| (a.as_bool(), b.as_bool()));
                match pair {
                    Some((Some(true), _)) | Some((_, Some(true))) => Value::TRUE,
                    Some((Some(false), Some(false))) => Value::FALSE,
                    _ => ill_typed("or", arg),
                }
            }),
        ),
        (
            "tuple_to_number",
            Value::native("tuple_to_number", |arg| match tuple_to_number(arg) {
                Some(n) => Value::Number(n),
                None => ill_typed("tuple_to_number", arg),
            }),
        ),
        (
            "tuple_to_symbol",
            Value::native("tuple_to_symbol", |arg| {
                tuple_to_symbol(arg).unwrap_or_else(|| ill_typed("tuple_to_symbol", arg))
            }),
        ),
        (
            "in_range_set",
            Value::native("in_range_set", |arg| match in_range_set(arg) {
                Some(b) => Value::Bool(b),
                None => ill_typed("in_range_set", arg),
            }),
        ),
        ("map_empty", map_empty()),
        (
            "map_bind",
            Value::native("map_bind", |arg| {
                map_bind(arg).unwrap_or_else(|| ill_typed("map_bind", arg))
            }),
        ),
    ]
}

/// `versions`: component versions, as symbols
pub fn versions() -> Value {
    Value::tuple([
        Value::symbol(&format!("humus-meta v{}", env!("CARGO_PKG_VERSION"))),
        Value::symbol("humus-core"),
    ])
}

/// Collects every message, pretty-printed
#[derive(Debug, Clone, Default)]
pub struct Println {
    output: Rc<RefCell<Vec<String>>>,
}

impl Println {
    /// Print into `output`, one line per message
    pub fn new(output: Rc<RefCell<Vec<String>>>) -> Self {
        Self { output }
    }
}

impl Behavior<Value> for Println {
    fn receive(&mut self, _ctx: &mut Context<'_, Value>, message: Value) {
        let line = message.to_string();
        tracing::info!(output = %line, "println");
        self.output.borrow_mut().push(line);
    }
}

/// Keeps the `(action, result)` trace tuples of committed and reverted
/// transactions
#[derive(Debug, Clone, Default)]
pub struct Logger {
    traces: Rc<RefCell<Vec<Value>>>,
}

impl Logger {
    /// Record every trace tuple in `traces`
    pub fn new(traces: Rc<RefCell<Vec<Value>>>) -> Self {
        Self { traces }
    }
}

impl Behavior<Value> for Logger {
    fn receive(&mut self, _ctx: &mut Context<'_, Value>, message: Value) {
        tracing::debug!(trace = %message, "transaction");
        self.traces.borrow_mut().push(message);
    }
}

/// `(delay, message, actor)`: sends `message` to `actor` after `delay` ms
#[derive(Debug, Clone, Copy, Default)]
pub struct Timer;

impl Behavior<Value> for Timer {
    fn receive(&mut self, ctx: &mut Context<'_, Value>, request: Value) {
        let parsed = request.as_pair().and_then(|(delay, rest)| {
            let delay = u64::try_from(delay.as_number()?).ok()?;
            let (message, actor) = rest.as_pair()?;
            Some((delay, message.clone(), actor.as_actor()?))
        });
        let Some((delay, message, target)) = parsed else {
            tracing::warn!(%request, "timer: invalid request");
            return;
        };
        if let Err(err) = ctx.send_after(delay, message, target) {
            tracing::warn!(%err, "timer: target is gone");
        }
    }
}

/// `(customer, range)`: sends the customer a number in `[0, range)`
#[derive(Debug, Clone)]
pub struct Random {
    rng: SeededRng,
}

impl Random {
    /// Draw from a generator seeded with `seed`
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SeededRng::new(seed),
        }
    }
}

impl Behavior<Value> for Random {
    fn receive(&mut self, ctx: &mut Context<'_, Value>, request: Value) {
        let parsed = request.as_pair().and_then(|(cust, range)| {
            let range = u64::try_from(range.as_number()?).ok()?;
            Some((cust.as_actor()?, range))
        });
        let Some((cust, range)) = parsed else {
            tracing::warn!(%request, "random: invalid request");
            return;
        };
        let Some(n) = self.rng.below(range).and_then(|n| i64::try_from(n).ok()) else {
            tracing::warn!(range, "random: empty range");
            return;
        };
        if let Err(err) = ctx.send(Value::Number(n), cust) {
            tracing::warn!(%err, "random: customer is gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use humus_core::{behavior::from_fn, Configuration};

    fn native(name: &str) -> Value {
        natives()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
            .expect("native defined")
    }

    fn call(name: &str, arg: Value) -> Value {
        match native(name) {
            Value::Native(f) => f.call(&arg),
            other => panic!("{name} is {other}"),
        }
    }

    fn codes(s: &str) -> Vec<Value> {
        s.bytes().map(|b| Value::Number(i64::from(b))).collect()
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(call("add", Value::pair(2, 3)), Value::Number(5));
        assert_eq!(call("sub", Value::pair(2, 3)), Value::Number(-1));
        assert_eq!(call("mul", Value::pair(4, 3)), Value::Number(12));
        assert_eq!(call("div", Value::pair(7, 2)), Value::Number(3));
        assert_eq!(call("div", Value::pair(-7, 2)), Value::Number(-4));
        assert_eq!(call("div", Value::pair(1, 0)), Value::Undefined);
        assert_eq!(call("neg", Value::Number(4)), Value::Number(-4));
        assert_eq!(call("add", Value::pair(1, Value::TRUE)), Value::Undefined);
        assert_eq!(call("add", Value::pair(i64::MAX, 1)), Value::Undefined);
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(call("compare", Value::pair(1, 2)), Value::Number(-1));
        assert_eq!(call("compare", Value::pair(Value::Nil, Value::Nil)), Value::Number(0));
        assert_eq!(call("compare", Value::pair(Value::Nil, 1)), Value::Undefined);
        assert_eq!(call("less", Value::pair(1, 2)), Value::TRUE);
        assert_eq!(call("less_equal", Value::pair(2, 2)), Value::TRUE);
        assert_eq!(call("greater", Value::pair(1, 2)), Value::FALSE);
        assert_eq!(call("greater_equal", Value::pair(3, 2)), Value::TRUE);
        assert_eq!(
            call("eq", Value::pair(Value::pair(1, 2), Value::pair(1, 2))),
            Value::TRUE
        );
    }

    #[test]
    fn test_logic() {
        assert_eq!(call("not", Value::TRUE), Value::FALSE);
        assert_eq!(call("and", Value::pair(true, true)), Value::TRUE);
        assert_eq!(call("and", Value::pair(Value::Nil, false)), Value::FALSE);
        assert_eq!(call("or", Value::pair(Value::Nil, true)), Value::TRUE);
        assert_eq!(call("or", Value::pair(false, false)), Value::FALSE);
        assert_eq!(call("or", Value::pair(false, Value::Nil)), Value::Undefined);
        assert_eq!(call("not", Value::Number(0)), Value::Undefined);
    }

    #[test]
    fn test_tuple_to_number() {
        let mut digits = vec![Value::Number(10)];
        digits.extend(codes("123"));
        assert_eq!(call("tuple_to_number", Value::list(digits)), Value::Number(123));

        let mut hex = vec![Value::Number(16)];
        hex.extend(codes("fF"));
        assert_eq!(call("tuple_to_number", Value::tuple(hex)), Value::Number(255));

        let mut bad = vec![Value::Number(8)];
        bad.extend(codes("9"));
        assert_eq!(call("tuple_to_number", Value::list(bad)), Value::Undefined);
    }

    #[test]
    fn test_tuple_to_symbol() {
        assert_eq!(
            call("tuple_to_symbol", Value::list(codes("ok"))),
            Value::symbol("ok")
        );
        assert_eq!(
            call("tuple_to_symbol", Value::tuple(codes("hi"))),
            Value::symbol("hi")
        );
        assert_eq!(call("tuple_to_symbol", Value::TRUE), Value::Undefined);
    }

    #[test]
    fn test_in_range_set() {
        let set = Value::list([Value::pair(48, 57), Value::Number(95)]);
        assert_eq!(call("in_range_set", Value::pair(set.clone(), 50)), Value::TRUE);
        assert_eq!(call("in_range_set", Value::pair(set.clone(), 95)), Value::TRUE);
        assert_eq!(call("in_range_set", Value::pair(set, 60)), Value::FALSE);
        assert_eq!(call("in_range_set", Value::pair(Value::Nil, Value::Nil)), Value::Undefined);
    }

    #[test]
    fn test_maps() {
        let map = call(
            "map_bind",
            Value::tuple([native("map_empty"), Value::symbol("a"), 1.into()]),
        );
        let map = match map {
            Value::Native(_) => call("map_bind", Value::tuple([map, Value::symbol("b"), 2.into()])),
            other => panic!("not a map: {other}"),
        };
        let Value::Native(lookup) = map else {
            panic!("not a map");
        };
        assert_eq!(lookup.call(&Value::symbol("a")), Value::Number(1));
        assert_eq!(lookup.call(&Value::symbol("b")), Value::Number(2));
        assert_eq!(lookup.call(&Value::symbol("c")), Value::Undefined);
    }

    #[test]
    fn test_println_collects_output() {
        let output = Rc::new(RefCell::new(Vec::new()));
        let mut config = Configuration::new();
        let println = config.create(Println::new(output.clone()), "println");

        config.send(Value::tuple([1.into(), Value::symbol("x")]), println).unwrap();
        config.send(Value::Undefined, println).unwrap();
        config.dispatch_loop(10);
        assert_eq!(*output.borrow(), vec!["1, #x".to_string(), "?".to_string()]);
    }

    #[test]
    fn test_timer_and_random() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut config = Configuration::new();
        let log = seen.clone();
        let out = config.create(
            from_fn(move |ctx: &mut Context<'_, Value>, v| log.borrow_mut().push((ctx.now(), v))),
            "out",
        );
        let timer = config.create(Timer, "timer");
        let random = config.create(Random::new(7), "random");

        config
            .send(Value::tuple([50.into(), Value::symbol("ping"), Value::Actor(out)]), timer)
            .unwrap();
        config.send(Value::pair(Value::Actor(out), 10), random).unwrap();
        config.send(Value::symbol("junk"), timer).unwrap();
        config.run_until_idle(100);

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        let n = seen[0].1.as_number().expect("random number");
        assert!((0..10).contains(&n));
        assert_eq!(seen[1], (50, Value::symbol("ping")));
    }
}
