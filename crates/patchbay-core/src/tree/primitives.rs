//! Helpers building trees of the built-in kinds.

use crate::value::{Object, Value};

use super::{NodeRepr, create_node};

fn props<const N: usize>(pairs: [(&str, Value); N]) -> Object {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Terminal node on output channel 0.
pub fn root(x: NodeRepr) -> NodeRepr {
    root_on(0, x)
}

/// Terminal node on the given output channel.
pub fn root_on(channel: usize, x: NodeRepr) -> NodeRepr {
    create_node("root", props([("channel", Value::from(channel))]), vec![x])
}

/// Constant signal.
pub fn constant(value: f64) -> NodeRepr {
    create_node("const", props([("value", Value::from(value))]), vec![])
}

/// Constant signal distinguished by `key`, so two keyed constants with the
/// same value stay separate nodes.
pub fn keyed_constant(key: &str, value: f64) -> NodeRepr {
    create_node(
        "const",
        props([("key", Value::from(key)), ("value", Value::from(value))]),
        vec![],
    )
}

/// Sine of `x`, in radians.
pub fn sin(x: NodeRepr) -> NodeRepr {
    create_node("sin", Object::new(), vec![x])
}

/// Product of two signals.
pub fn mul2(x: NodeRepr, y: NodeRepr) -> NodeRepr {
    create_node("mul", Object::new(), vec![x, y])
}

/// Sum of two signals.
pub fn add2(x: NodeRepr, y: NodeRepr) -> NodeRepr {
    create_node("add", Object::new(), vec![x, y])
}

/// Ramp from 0 to 1 at the frequency given by `rate`.
pub fn phasor(rate: NodeRepr) -> NodeRepr {
    create_node("phasor", Object::new(), vec![rate])
}

/// External input channel.
pub fn input(channel: usize) -> NodeRepr {
    create_node("in", props([("channel", Value::from(channel))]), vec![])
}

/// Playback of one channel of a registered resource.
pub fn sample(path: &str, channel: usize, looping: bool) -> NodeRepr {
    create_node(
        "sample",
        props([
            ("path", Value::from(path)),
            ("channel", Value::from(channel)),
            ("loop", Value::from(looping)),
        ]),
        vec![],
    )
}

/// Passes `x` through and reports its range as `source: name` events.
pub fn meter(name: &str, x: NodeRepr) -> NodeRepr {
    create_node("meter", props([("name", Value::from(name))]), vec![x])
}

/// Sine oscillator at `freq` Hz: `sin(2π · phasor(freq))`.
pub fn cycle(freq: NodeRepr) -> NodeRepr {
    sin(mul2(constant(std::f64::consts::TAU), phasor(freq)))
}
