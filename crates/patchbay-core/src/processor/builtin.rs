//! Built-in node kinds.

use crate::buffer::Inputs;
use crate::event::AudioEvent;
use crate::value::ValueKind;

use super::{
    KindCategory, KindDescriptor, NodeProcessor, ParamSpec, ProcessContext, ProcessFault,
    ProcessorRegistry, ProcessorSetup,
};

const ROOT_PARAMS: &[ParamSpec] = &[ParamSpec::channel("channel")];
const CONST_PARAMS: &[ParamSpec] = &[ParamSpec::new("value", ValueKind::Number)];
const INPUT_PARAMS: &[ParamSpec] = &[ParamSpec::channel("channel")];
const PHASOR_PARAMS: &[ParamSpec] = &[ParamSpec::new("freq", ValueKind::Number)];
const SAMPLE_PARAMS: &[ParamSpec] = &[
    ParamSpec::new("path", ValueKind::String),
    ParamSpec::channel("channel"),
    ParamSpec::new("loop", ValueKind::Boolean),
];
const METER_PARAMS: &[ParamSpec] = &[ParamSpec::new("name", ValueKind::String)];

/// Register all built-in kinds.
pub(super) fn register_builtin_kinds(registry: &mut ProcessorRegistry) {
    registry.register(
        KindDescriptor {
            id: "root",
            description: "Terminal node summed into an output channel",
            category: KindCategory::Routing,
            outputs: 1,
            params: ROOT_PARAMS,
            resource_key: None,
            delay: false,
        },
        |_| Box::new(Root),
    );

    registry.register(
        KindDescriptor {
            id: "const",
            description: "Constant signal",
            category: KindCategory::Source,
            outputs: 1,
            params: CONST_PARAMS,
            resource_key: None,
            delay: false,
        },
        |_| Box::new(Constant),
    );

    registry.register(
        KindDescriptor {
            id: "in",
            description: "External audio input channel",
            category: KindCategory::Source,
            outputs: 1,
            params: INPUT_PARAMS,
            resource_key: None,
            delay: false,
        },
        |_| Box::new(InputTap),
    );

    registry.register(
        KindDescriptor {
            id: "add",
            description: "Sum of all inputs",
            category: KindCategory::Math,
            outputs: 1,
            params: &[],
            resource_key: None,
            delay: false,
        },
        |_| Box::new(Add),
    );

    registry.register(
        KindDescriptor {
            id: "mul",
            description: "Product of all inputs",
            category: KindCategory::Math,
            outputs: 1,
            params: &[],
            resource_key: None,
            delay: false,
        },
        |_| Box::new(Mul),
    );

    registry.register(
        KindDescriptor {
            id: "phasor",
            description: "Rising ramp from 0 to 1 at the input (or `freq`) rate",
            category: KindCategory::Source,
            outputs: 1,
            params: PHASOR_PARAMS,
            resource_key: None,
            delay: false,
        },
        |setup| Box::new(Phasor::new(setup.sample_rate)),
    );

    registry.register(
        KindDescriptor {
            id: "sin",
            description: "Sine of the input, in radians",
            category: KindCategory::Math,
            outputs: 1,
            params: &[],
            resource_key: None,
            delay: false,
        },
        |_| Box::new(Sine),
    );

    registry.register(
        KindDescriptor {
            id: "sample",
            description: "Plays one channel of a registered resource",
            category: KindCategory::Source,
            outputs: 1,
            params: SAMPLE_PARAMS,
            resource_key: Some("path"),
            delay: false,
        },
        |_| Box::new(Sample::default()),
    );

    registry.register(
        KindDescriptor {
            id: "meter",
            description: "Passthrough reporting the per-block signal range",
            category: KindCategory::Analysis,
            outputs: 1,
            params: METER_PARAMS,
            resource_key: None,
            delay: false,
        },
        |_| Box::new(Meter),
    );

    registry.register(
        KindDescriptor {
            id: "delay1b",
            description: "One-block delay; may close a feedback loop",
            category: KindCategory::Routing,
            outputs: 1,
            params: &[],
            resource_key: None,
            delay: true,
        },
        |setup| Box::new(BlockDelay::new(setup.block_size)),
    );

    registry.register(
        KindDescriptor {
            id: "passthrough",
            description: "Copies its first input",
            category: KindCategory::Routing,
            outputs: 1,
            params: &[],
            resource_key: None,
            delay: false,
        },
        |_| Box::new(Passthrough),
    );
}

/// Copies input 0 to output 0, or silence when unconnected.
fn copy_first_input(ctx: &mut ProcessContext<'_>) {
    let out = ctx.outputs.channel(0);
    match ctx.inputs.get(0) {
        Some(input) => out.copy_from_slice(input),
        None => out.fill(0.0),
    }
}

/// Terminal node. Its output is summed into the render output.
#[derive(Debug, Default)]
pub struct Root;

impl NodeProcessor for Root {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessFault> {
        copy_first_input(ctx);
        Ok(())
    }
}

/// Copies its first input.
#[derive(Debug, Default)]
pub struct Passthrough;

impl NodeProcessor for Passthrough {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessFault> {
        copy_first_input(ctx);
        Ok(())
    }
}

/// Outputs the `value` parameter on every sample.
#[derive(Debug, Default)]
pub struct Constant;

impl NodeProcessor for Constant {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessFault> {
        let value = ctx.param("value", 0.0) as f32;
        ctx.outputs.channel(0).fill(value);
        Ok(())
    }
}

/// Reads the external input channel named by `channel`.
#[derive(Debug, Default)]
pub struct InputTap;

impl NodeProcessor for InputTap {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessFault> {
        let channel = ctx.param("channel", 0.0) as usize;
        let source = ctx.external.channel(channel);
        let out = ctx.outputs.channel(0);
        match source {
            Some(samples) => out.copy_from_slice(samples),
            None => out.fill(0.0),
        }
        Ok(())
    }
}

/// Sample-wise sum of every input.
#[derive(Debug, Default)]
pub struct Add;

impl NodeProcessor for Add {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessFault> {
        let out = ctx.outputs.channel(0);
        out.fill(0.0);
        for input in ctx.inputs.iter() {
            for (o, i) in out.iter_mut().zip(input) {
                *o += *i;
            }
        }
        Ok(())
    }
}

/// Sample-wise product of every input. Silent with no inputs.
#[derive(Debug, Default)]
pub struct Mul;

impl NodeProcessor for Mul {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessFault> {
        let out = ctx.outputs.channel(0);
        if ctx.inputs.is_empty() {
            out.fill(0.0);
            return Ok(());
        }
        out.fill(1.0);
        for index in 0..ctx.inputs.len() {
            match ctx.inputs.get(index) {
                Some(input) => {
                    for (o, i) in out.iter_mut().zip(input) {
                        *o *= *i;
                    }
                }
                None => out.fill(0.0),
            }
        }
        Ok(())
    }
}

/// Ramp from 0 to 1, repeating at the frequency given by input 0 or `freq`.
#[derive(Debug)]
pub struct Phasor {
    phase: f64,
    sample_rate: f64,
}

impl Phasor {
    /// Creates a phasor starting at phase 0.
    pub fn new(sample_rate: f64) -> Self {
        Self {
            phase: 0.0,
            sample_rate,
        }
    }

    /// Current phase in `[0, 1)`.
    pub fn phase(&self) -> f64 {
        self.phase
    }
}

impl NodeProcessor for Phasor {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessFault> {
        if self.sample_rate <= 0.0 {
            return Err(ProcessFault("phasor needs a positive sample rate"));
        }
        let fixed = ctx.param("freq", 0.0);
        let rate = ctx.inputs.get(0);
        let out = ctx.outputs.channel(0);
        for (i, o) in out.iter_mut().enumerate() {
            *o = self.phase as f32;
            let freq = rate.map_or(fixed, |r| f64::from(r[i]));
            self.phase = (self.phase + freq / self.sample_rate).rem_euclid(1.0);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }
}

/// Sine of input 0 (radians).
#[derive(Debug, Default)]
pub struct Sine;

impl NodeProcessor for Sine {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessFault> {
        let input = ctx.inputs.get(0);
        let out = ctx.outputs.channel(0);
        match input {
            Some(x) => {
                for (o, i) in out.iter_mut().zip(x) {
                    *o = i.sin();
                }
            }
            None => out.fill(0.0),
        }
        Ok(())
    }
}

/// Plays channel `channel` of the resource named by `path`.
///
/// Playback starts at the first frame when the node is created. With `loop`
/// set it wraps at the end, otherwise it goes silent.
#[derive(Debug, Default)]
pub struct Sample {
    position: usize,
}

impl NodeProcessor for Sample {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessFault> {
        let channel = ctx.param("channel", 0.0) as usize;
        let looping = ctx.flag("loop", false);
        let data = ctx.resource.map_or(&[][..], |r| r.channel(channel));
        let out = ctx.outputs.channel(0);
        if data.is_empty() {
            out.fill(0.0);
            return Ok(());
        }
        for o in out.iter_mut() {
            if self.position >= data.len() {
                if looping {
                    self.position = 0;
                } else {
                    *o = 0.0;
                    continue;
                }
            }
            *o = data[self.position];
            self.position += 1;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.position = 0;
    }
}

/// Passes input 0 through and reports its range once per block.
#[derive(Debug, Default)]
pub struct Meter;

impl NodeProcessor for Meter {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessFault> {
        copy_first_input(ctx);
        let node = ctx.node;
        let out = ctx.outputs.channel(0);
        let (min, max) = out
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &s| {
                (lo.min(s), hi.max(s))
            });
        if min <= max {
            ctx.emit(AudioEvent::Meter { node, min, max });
        }
        Ok(())
    }
}

/// Delays input 0 by one block.
///
/// Evaluation order ignores its inputs, so it can close a feedback loop: the
/// block's input is captured once every node has rendered and played back on
/// the next block.
#[derive(Debug)]
pub struct BlockDelay {
    held: Vec<f32>,
    len: usize,
}

impl BlockDelay {
    /// Creates a delay holding up to `block_size` frames.
    pub fn new(block_size: usize) -> Self {
        Self {
            held: vec![0.0; block_size],
            len: 0,
        }
    }
}

impl NodeProcessor for BlockDelay {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessFault> {
        let out = ctx.outputs.channel(0);
        let n = self.len.min(out.len());
        out[..n].copy_from_slice(&self.held[..n]);
        out[n..].fill(0.0);
        Ok(())
    }

    fn capture(&mut self, inputs: &Inputs<'_>) {
        match inputs.get(0) {
            Some(input) => {
                let n = input.len().min(self.held.len());
                self.held[..n].copy_from_slice(&input[..n]);
                self.len = n;
            }
            None => self.len = 0,
        }
    }

    fn reset(&mut self) {
        self.held.fill(0.0);
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BlockBuffers;
    use crate::event::EventChannel;
    use crate::graph::NodeId;
    use crate::processor::ExternalInput;
    use crate::value::{Object, Value};

    /// Renders `processor` as unit 0 of a pool whose remaining units are
    /// filled with the given input signals.
    fn render(
        processor: &mut dyn NodeProcessor,
        props: &Object,
        inputs: &[Vec<f32>],
        events: &EventChannel<AudioEvent>,
    ) -> Result<Vec<f32>, ProcessFault> {
        let frames = inputs.first().map_or(8, Vec::len);
        let mut pool = BlockBuffers::new(inputs.len() + 1, frames);
        for (i, signal) in inputs.iter().enumerate() {
            let (_, mut out) = pool.split(i + 1, 1, frames, &[]);
            out.channel(0).copy_from_slice(signal);
        }
        let refs: Vec<usize> = (1..=inputs.len()).collect();
        let (ins, outs) = pool.split(0, 1, frames, &refs);
        let mut ctx = ProcessContext::new(
            NodeId::new(1),
            props,
            ins,
            outs,
            None,
            ExternalInput::none(),
            4.0,
            events,
        );
        processor.process(&mut ctx)?;
        Ok(pool.unit(0, frames).to_vec())
    }

    fn props(pairs: &[(&str, Value)]) -> Object {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn add_and_mul_combine_inputs() {
        let events = EventChannel::new(4);
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![0.5, 0.5, -1.0];
        let sum = render(&mut Add, &Object::new(), &[a.clone(), b.clone()], &events).unwrap();
        assert_eq!(sum, vec![1.5, 2.5, 2.0]);
        let product = render(&mut Mul, &Object::new(), &[a, b], &events).unwrap();
        assert_eq!(product, vec![0.5, 1.0, -3.0]);
    }

    #[test]
    fn const_fills_value() {
        let events = EventChannel::new(4);
        let out = render(
            &mut Constant,
            &props(&[("value", Value::from(0.25))]),
            &[],
            &events,
        )
        .unwrap();
        assert!(out.iter().all(|&s| s == 0.25));
    }

    #[test]
    fn phasor_wraps_and_keeps_phase() {
        let events = EventChannel::new(4);
        // 1 Hz at a 4 Hz sample rate: quarter steps.
        let mut phasor = Phasor::new(4.0);
        let p = props(&[("freq", Value::from(1.0))]);
        let out = render(&mut phasor, &p, &[], &events).unwrap();
        assert_eq!(out, vec![0.0, 0.25, 0.5, 0.75, 0.0, 0.25, 0.5, 0.75]);
        let again = render(&mut phasor, &p, &[], &events).unwrap();
        assert_eq!(again[0], 0.0);
        phasor.reset();
        assert_eq!(phasor.phase(), 0.0);
    }

    #[test]
    fn meter_reports_range() {
        let events = EventChannel::new(4);
        let out = render(&mut Meter, &Object::new(), &[vec![0.2, -0.7, 0.4]], &events).unwrap();
        assert_eq!(out, vec![0.2, -0.7, 0.4]);
        assert_eq!(
            events.drain_all(),
            vec![AudioEvent::Meter {
                node: NodeId::new(1),
                min: -0.7,
                max: 0.4
            }]
        );
    }

    #[test]
    fn block_delay_replays_captured_block() {
        let mut delay = BlockDelay::new(4);
        let mut pool = BlockBuffers::new(2, 4);
        {
            let (_, mut out) = pool.split(1, 1, 4, &[]);
            out.channel(0).copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        }
        let refs = [1usize];
        delay.capture(&pool.inputs(4, &refs));

        let events = EventChannel::new(1);
        let out = render(&mut delay, &Object::new(), &[vec![0.0; 4]], &events).unwrap();
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0]);
        delay.reset();
        let out = render(&mut delay, &Object::new(), &[vec![0.0; 4]], &events).unwrap();
        assert_eq!(out, vec![0.0; 4]);
    }

    #[test]
    fn sample_without_resource_is_silent() {
        let events = EventChannel::new(1);
        let out = render(
            &mut Sample::default(),
            &props(&[("path", Value::from("missing"))]),
            &[],
            &events,
        )
        .unwrap();
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
