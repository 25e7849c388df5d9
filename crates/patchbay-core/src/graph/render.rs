//! Block rendering of a committed snapshot.
//!
//! Everything here runs on the audio context: no allocation, no blocking
//! locks, no logging. Locks are only ever attempted with `try_lock`; a step
//! whose state is unavailable renders silence and reports a fault event.

use crate::buffer::BlockBuffers;
use crate::event::{AudioEvent, EventChannel, FaultKind};
use crate::processor::{ExternalInput, ProcessContext, ProcessFault};

use super::schedule::RenderGraph;

impl RenderGraph {
    /// Renders `frames` frames into `outputs`, where `frames` is the length of
    /// the shortest output channel.
    ///
    /// Output channels are cleared first and each root tap is summed into the
    /// channel it names; taps naming a channel beyond `outputs` are skipped.
    /// Longer requests are rendered in sub-blocks of at most
    /// [`block_size`](Self::block_size) frames.
    ///
    /// Returns false if the scratch buffers were busy (another render of this
    /// snapshot was in progress); the output is then silence.
    pub fn render(
        &self,
        external: &[&[f32]],
        outputs: &mut [&mut [f32]],
        events: &EventChannel<AudioEvent>,
    ) -> bool {
        for channel in outputs.iter_mut() {
            channel.fill(0.0);
        }
        let frames = outputs.iter().map(|c| c.len()).min().unwrap_or(0);
        if self.steps.is_empty() || frames == 0 || self.block_size == 0 {
            return true;
        }
        let Some(mut pool) = self.buffers.try_lock() else {
            return false;
        };

        let mut offset = 0;
        while offset < frames {
            let n = (frames - offset).min(self.block_size);
            let input = ExternalInput::new(external, offset, n);
            self.render_block(&mut pool, input, n, events);
            for tap in &self.taps {
                let Some(out) = outputs.get_mut(tap.channel) else {
                    continue;
                };
                let signal = pool.unit(tap.unit, n);
                for (o, s) in out[offset..offset + n].iter_mut().zip(signal) {
                    *o += *s;
                }
            }
            offset += n;
        }
        true
    }

    fn render_block(
        &self,
        pool: &mut BlockBuffers,
        external: ExternalInput<'_>,
        frames: usize,
        events: &EventChannel<AudioEvent>,
    ) {
        for step in &self.steps {
            let (inputs, mut outputs) =
                pool.split(step.first_unit, step.outputs, frames, &step.inputs);
            let Some(mut processor) = step.processor.try_lock() else {
                outputs.silence();
                events.push(AudioEvent::Fault {
                    node: step.id,
                    kind: FaultKind::Contended,
                });
                continue;
            };

            let mut ctx = ProcessContext::new(
                step.id,
                &step.props,
                inputs,
                outputs,
                step.resource.as_deref(),
                external,
                self.sample_rate,
                events,
            );
            let result = processor.process(&mut ctx);
            let mut outputs = ctx.into_outputs();

            let fault = match result {
                Err(ProcessFault(message)) => Some(FaultKind::Failed(message)),
                Ok(()) if !outputs.is_finite() => Some(FaultKind::NonFinite),
                Ok(()) => None,
            };
            if let Some(kind) = fault {
                outputs.silence();
                events.push(AudioEvent::Fault {
                    node: step.id,
                    kind,
                });
            }
        }

        for &index in &self.delays {
            let step = &self.steps[index];
            if let Some(mut processor) = step.processor.try_lock() {
                processor.capture(&pool.inputs(frames, &step.inputs));
            }
        }
    }
}
