use derive_more::{Deref, Display};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    cpu,
    kernel::ElementwiseKernel,
    quant::{Flags, LookupTable, QuantizationParams},
};
use crate::loom::{
    buffer::{Buffer, RowLayout},
    platform,
    pool::ThreadPool,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OperatorError {
    #[error("operator is not in a state that allows this call: {0}")]
    Uninitialized(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("unsupported parameter: {0}")]
    UnsupportedParameter(String),
    #[error("insufficient memory: {0}")]
    InsufficientMemory(String),
    #[error("insufficient resources: {0}")]
    InsufficientResources(String),
}

impl OperatorError {
    #[inline]
    pub fn status(&self) -> Status {
        match self {
            OperatorError::Uninitialized(_) => Status::Uninitialized,
            OperatorError::InvalidParameter(_) => Status::InvalidParameter,
            OperatorError::UnsupportedParameter(_) => Status::UnsupportedParameter,
            OperatorError::InsufficientMemory(_) => Status::InsufficientMemory,
            OperatorError::InsufficientResources(_) => Status::InsufficientResources,
        }
    }
}

/// Closed set of outcomes of an operator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Status {
    Success,
    Uninitialized,
    InvalidParameter,
    UnsupportedParameter,
    InsufficientMemory,
    InsufficientResources,
}

impl<T> From<&Result<T, OperatorError>> for Status {
    #[inline]
    fn from(value: &Result<T, OperatorError>) -> Self {
        match value {
            Ok(_) => Status::Success,
            Err(err) => err.status(),
        }
    }
}

impl From<&OperatorError> for Status {
    #[inline]
    fn from(value: &OperatorError) -> Self {
        value.status()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Deref)]
#[display("#{}", _0.get())]
pub struct OperatorId(uid::Id<OperatorId>);

impl OperatorId {
    #[inline]
    fn new() -> Self {
        Self(uid::Id::new())
    }
}

/// Immutable configuration of one operator: everything decided at creation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorDescriptor {
    name: &'static str,
    channels: usize,
    params: QuantizationParams,
    flags: Flags,
    table: LookupTable,
}

impl OperatorDescriptor {
    fn new(
        kernel: &dyn ElementwiseKernel,
        channels: usize,
        params: QuantizationParams,
        flags: Flags,
    ) -> Result<Self, OperatorError> {
        if channels == 0 {
            return Err(OperatorError::InvalidParameter(
                "channels must be positive".into(),
            ));
        }
        params.validate()?;
        flags.check();
        kernel.check(&params)?;

        let table = LookupTable::build(kernel, &params)?;
        let name = kernel.name();
        Ok(Self {
            name,
            channels,
            params,
            flags,
            table,
        })
    }

    /// Name of the kernel the table was built from.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn params(&self) -> &QuantizationParams {
        &self.params
    }

    #[inline]
    pub fn flags(&self) -> Flags {
        self.flags
    }

    #[inline]
    pub fn table(&self) -> &LookupTable {
        &self.table
    }
}

/// Association of a descriptor with caller buffers for one batch shape.
#[derive(Debug, Clone)]
pub struct Binding {
    pub input: Buffer,
    pub input_layout: RowLayout,
    pub output: Buffer,
    pub output_layout: RowLayout,
}

impl Binding {
    fn new(
        channels: usize,
        batch_size: usize,
        input: &Buffer,
        input_stride: usize,
        output: &Buffer,
        output_stride: usize,
    ) -> Result<Self, OperatorError> {
        if batch_size == 0 {
            return Err(OperatorError::InvalidParameter(
                "batch size must be positive".into(),
            ));
        }
        if input_stride < channels {
            return Err(OperatorError::InvalidParameter(format!(
                "input stride {input_stride} is smaller than {channels} channels"
            )));
        }
        if output_stride < channels {
            return Err(OperatorError::InvalidParameter(format!(
                "output stride {output_stride} is smaller than {channels} channels"
            )));
        }
        if input.same(output) && input_stride != output_stride {
            return Err(OperatorError::InvalidParameter(format!(
                "in-place operation needs equal strides, got {input_stride} and {output_stride}"
            )));
        }

        let input_layout = RowLayout::new(batch_size, channels, input_stride);
        let output_layout = RowLayout::new(batch_size, channels, output_stride);
        check_span("input", input, input_layout)?;
        check_span("output", output, output_layout)?;

        let input = input.clone();
        let output = output.clone();
        Ok(Self {
            input,
            input_layout,
            output,
            output_layout,
        })
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.input_layout.rows
    }

    /// Returns `true` if input and output are the same buffer.
    #[inline]
    pub fn is_in_place(&self) -> bool {
        self.input.same(&self.output)
    }
}

fn check_span(side: &str, buffer: &Buffer, layout: RowLayout) -> Result<(), OperatorError> {
    let Some(span) = layout.span() else {
        return Err(OperatorError::InvalidParameter(format!(
            "{side} layout {layout} overflows the address space"
        )));
    };
    let len = buffer.len();
    if len < span {
        return Err(OperatorError::InvalidParameter(format!(
            "{side} buffer of {len} bytes cannot hold layout {layout}"
        )));
    }
    Ok(())
}

/// Externally visible lifecycle stage of an [`Operator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum LifecycleState {
    Uninitialized,
    Created,
    Bound,
    Terminated,
}

#[derive(Debug)]
enum State {
    Uninitialized,
    Live {
        descriptor: OperatorDescriptor,
        binding: Option<Binding>,
    },
    Terminated,
}

/// A quantized elementwise operator handle.
///
/// A default-constructed operator was never created; every call on it fails with
/// [`OperatorError::Uninitialized`].
#[derive(Debug)]
pub struct Operator {
    id: OperatorId,
    state: State,
}

impl Default for Operator {
    fn default() -> Self {
        let id = OperatorId::new();
        let state = State::Uninitialized;
        Self { id, state }
    }
}

impl Operator {
    /// Creates an operator applying `kernel` to `channels` bytes per row.
    ///
    /// The kernel is tabulated here over all 256 input codes; later runs only look up bytes.
    /// Requires a prior successful [`platform::initialize`].
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all, fields(kernel = kernel.name())))]
    pub fn create(
        kernel: &dyn ElementwiseKernel,
        channels: usize,
        params: QuantizationParams,
        flags: Flags,
    ) -> Result<Self, OperatorError> {
        let name = kernel.name();
        if platform::platform().is_none() {
            let err = OperatorError::Uninitialized("backend is not initialized".into());
            log::error!("failed to create {name} operator: {err}");
            return Err(err);
        }

        let descriptor = OperatorDescriptor::new(kernel, channels, params, flags)
            .inspect_err(|err| log::error!("failed to create {name} operator: {err}"))?;
        let binding = None;
        let state = State::Live {
            descriptor,
            binding,
        };
        let id = OperatorId::new();
        log::debug!("created {name} operator {id} with {channels} channels");
        Ok(Self { id, state })
    }

    #[inline]
    pub fn id(&self) -> OperatorId {
        self.id
    }

    #[inline]
    pub fn state(&self) -> LifecycleState {
        match &self.state {
            State::Uninitialized => LifecycleState::Uninitialized,
            State::Live { binding: None, .. } => LifecycleState::Created,
            State::Live {
                binding: Some(_), ..
            } => LifecycleState::Bound,
            State::Terminated => LifecycleState::Terminated,
        }
    }

    #[inline]
    pub fn descriptor(&self) -> Option<&OperatorDescriptor> {
        match &self.state {
            State::Live { descriptor, .. } => Some(descriptor),
            _ => None,
        }
    }

    #[inline]
    pub fn binding(&self) -> Option<&Binding> {
        match &self.state {
            State::Live { binding, .. } => binding.as_ref(),
            _ => None,
        }
    }

    fn misuse(&self, call: &str) -> OperatorError {
        let err = OperatorError::Uninitialized(format!(
            "cannot {call} operator {} in state {}",
            self.id,
            self.state()
        ));
        log::error!("{err}");
        err
    }

    /// Binds the operator to `batch_size` rows of caller buffers.
    ///
    /// Row `r` is read from `input[r * input_stride..][..channels]` and written to
    /// `output[r * output_stride..][..channels]`. Reads and writes nothing now. On failure
    /// the previous binding, if any, stays in place.
    pub fn setup(
        &mut self,
        batch_size: usize,
        input: &Buffer,
        input_stride: usize,
        output: &Buffer,
        output_stride: usize,
    ) -> Result<(), OperatorError> {
        let id = self.id;
        let State::Live {
            descriptor,
            binding,
        } = &mut self.state
        else {
            return Err(self.misuse("setup"));
        };

        let name = descriptor.name;
        let channels = descriptor.channels;
        let next = Binding::new(
            channels,
            batch_size,
            input,
            input_stride,
            output,
            output_stride,
        )
        .inspect_err(|err| log::error!("failed to setup {name} operator {id}: {err}"))?;

        log::debug!(
            "bound {name} operator {id}: {} → {}",
            next.input_layout,
            next.output_layout
        );
        *binding = Some(next);
        Ok(())
    }

    /// Transforms every bound row. Blocks until all rows are written.
    ///
    /// With a `pool`, tiles of rows are spread over its workers; the output does not depend
    /// on how the work is partitioned.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all, fields(id = %self.id)))]
    pub fn run(&self, pool: Option<&dyn ThreadPool>) -> Result<(), OperatorError> {
        let State::Live {
            descriptor,
            binding: Some(binding),
        } = &self.state
        else {
            return Err(self.misuse("run"));
        };

        log::trace!(
            "run {} operator {} over {} rows",
            descriptor.name,
            self.id,
            binding.batch_size()
        );
        cpu::lut::execute(descriptor.table(), binding, pool).inspect_err(|err| {
            log::error!("failed to run {} operator {}: {err}", descriptor.name, self.id)
        })
    }

    /// Releases the descriptor and binding. The operator is unusable afterwards.
    pub fn delete(&mut self) -> Result<(), OperatorError> {
        match self.state {
            State::Live { .. } => {
                self.state = State::Terminated;
                log::debug!("deleted operator {}", self.id);
                Ok(())
            }
            State::Uninitialized | State::Terminated => Err(self.misuse("delete")),
        }
    }
}

/// A typed operator handle. Implement with `#[derive(QuantizedOp)]`.
pub trait QuantizedOp {
    fn operator(&self) -> &Operator;
    fn operator_mut(&mut self) -> &mut Operator;

    #[inline]
    fn state(&self) -> LifecycleState {
        self.operator().state()
    }

    #[inline]
    fn descriptor(&self) -> Option<&OperatorDescriptor> {
        self.operator().descriptor()
    }

    /// See [`Operator::setup`].
    #[inline]
    fn setup(
        &mut self,
        batch_size: usize,
        input: &Buffer,
        input_stride: usize,
        output: &Buffer,
        output_stride: usize,
    ) -> Result<(), OperatorError> {
        self.operator_mut()
            .setup(batch_size, input, input_stride, output, output_stride)
    }

    /// See [`Operator::run`].
    #[inline]
    fn run(&self, pool: Option<&dyn ThreadPool>) -> Result<(), OperatorError> {
        self.operator().run(pool)
    }

    /// See [`Operator::delete`].
    #[inline]
    fn delete(&mut self) -> Result<(), OperatorError> {
        self.operator_mut().delete()
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::{LifecycleState, Operator, OperatorError, Status};
    use crate::{
        hal::{
            kernel::{HardSwish, Identity, LeakyRelu, Sigmoid, Tanh},
            quant::{Flags, QuantizationParams},
        },
        loom::{
            buffer::Buffer,
            platform,
            pool::{ScopedPool, ThreadPool},
        },
    };

    const PARAMS: QuantizationParams = QuantizationParams::new(127, 1.0, 0, 1.0 / 256.0);

    fn tanh(channels: usize) -> Result<Operator, OperatorError> {
        platform::initialize()?;
        Operator::create(&Tanh, channels, PARAMS, Flags::NONE)
    }

    fn random_buffer(len: usize) -> Buffer {
        std::iter::repeat_with(|| fastrand::u8(..))
            .take(len)
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn test_create_delete() -> Result<(), Box<dyn Error>> {
        for channels in [1, 3, 16, 1000] {
            let mut op = tanh(channels)?;
            assert_eq!(op.state(), LifecycleState::Created);
            assert_eq!(op.descriptor().map(|d| d.channels()), Some(channels));
            op.delete()?;
            assert_eq!(op.state(), LifecycleState::Terminated);
            assert!(op.descriptor().is_none());
        }
        Ok(())
    }

    #[test]
    fn test_create_invalid() -> Result<(), Box<dyn Error>> {
        platform::initialize()?;

        let result = Operator::create(&Tanh, 0, PARAMS, Flags::NONE);
        assert_eq!(Status::from(&result), Status::InvalidParameter);

        let params = PARAMS.with_output_range(200, 100);
        let result = Operator::create(&Tanh, 4, params, Flags::NONE);
        assert_eq!(Status::from(&result), Status::InvalidParameter);

        let params = QuantizationParams::new(127, 0.0, 0, 1.0);
        let result = Operator::create(&Sigmoid, 4, params, Flags::NONE);
        assert_eq!(Status::from(&result), Status::InvalidParameter);

        // unknown flag bits are ignored
        let op = Operator::create(&Tanh, 4, PARAMS, Flags(0x8001))?;
        assert_eq!(op.state(), LifecycleState::Created);
        assert_eq!(op.descriptor().map(|d| d.flags()), Some(Flags(0x8001)));

        let relu = LeakyRelu {
            negative_slope: 0.1,
        };
        let params = QuantizationParams::new(0, 1000.0, 0, 1.0);
        let result = Operator::create(&relu, 4, params, Flags::NONE);
        assert_eq!(Status::from(&result), Status::UnsupportedParameter);
        Ok(())
    }

    #[test]
    fn test_lifecycle_misuse() -> Result<(), Box<dyn Error>> {
        let input = Buffer::filled(8, 127);
        let output = Buffer::filled(8, 0xA5);

        // never created
        let mut op = Operator::default();
        assert_eq!(op.state(), LifecycleState::Uninitialized);
        let result = op.setup(2, &input, 4, &output, 4);
        assert_eq!(Status::from(&result), Status::Uninitialized);
        assert_eq!(Status::from(&op.run(None)), Status::Uninitialized);
        assert_eq!(Status::from(&op.delete()), Status::Uninitialized);

        // created but not bound
        let mut op = tanh(4)?;
        assert_eq!(Status::from(&op.run(None)), Status::Uninitialized);

        op.setup(2, &input, 4, &output, 4)?;
        assert_eq!(op.state(), LifecycleState::Bound);
        op.run(None)?;

        // terminated
        op.delete()?;
        let result = op.setup(2, &input, 4, &output, 4);
        assert_eq!(Status::from(&result), Status::Uninitialized);
        assert_eq!(Status::from(&op.run(None)), Status::Uninitialized);
        assert_eq!(Status::from(&op.delete()), Status::Uninitialized);
        assert_eq!(op.state(), LifecycleState::Terminated);
        Ok(())
    }

    #[test]
    fn test_setup_invalid_keeps_binding() -> Result<(), Box<dyn Error>> {
        let mut op = tanh(4)?;
        let input = Buffer::filled(8, 127);
        let output = Buffer::filled(8, 0xA5);

        let result = op.setup(2, &input, 3, &output, 4);
        assert_eq!(Status::from(&result), Status::InvalidParameter);
        assert_eq!(op.state(), LifecycleState::Created);

        op.setup(2, &input, 4, &output, 4)?;

        let cases = [
            op.setup(2, &input, 4, &output, 3),
            op.setup(2, &input, 2, &output, 4),
            op.setup(0, &input, 4, &output, 4),
            // buffers too short for three rows
            op.setup(3, &input, 4, &output, 4),
            // in-place with mismatched strides
            op.setup(1, &input, 4, &input, 5),
        ];
        for result in cases {
            assert_eq!(Status::from(&result), Status::InvalidParameter);
        }

        assert_eq!(op.state(), LifecycleState::Bound);
        let binding = op.binding().ok_or("binding lost")?;
        assert_eq!(binding.batch_size(), 2);
        assert_eq!(binding.input_layout.stride, 4);

        op.run(None)?;
        assert_eq!(output.to_vec(), [0; 8]);
        Ok(())
    }

    #[test]
    fn test_setup_stride_overflow() -> Result<(), Box<dyn Error>> {
        let mut op = tanh(4)?;
        let data = Buffer::filled(8, 127);
        let output = Buffer::filled(8, 0xA5);

        let huge = usize::MAX / 2 + 1;
        let cases = [
            op.setup(3, &data, huge, &data, huge),
            op.setup(3, &data, 4, &output, huge),
            op.setup(usize::MAX, &data, 4, &output, 4),
        ];
        for result in cases {
            assert_eq!(Status::from(&result), Status::InvalidParameter);
        }
        assert_eq!(op.state(), LifecycleState::Created);

        // a single row never steps over its stride
        op.setup(1, &data, usize::MAX, &output, usize::MAX)?;
        op.run(Some(&ScopedPool::new(4)))?;
        assert_eq!(output.to_vec(), [0, 0, 0, 0, 0xA5, 0xA5, 0xA5, 0xA5]);
        Ok(())
    }

    #[test]
    fn test_tanh_zero_point() -> Result<(), Box<dyn Error>> {
        let mut op = tanh(4)?;
        let input = Buffer::from(vec![127, 127, 127, 127, 255, 0, 128, 126]);
        let output = Buffer::filled(8, 0xA5);
        op.setup(2, &input, 4, &output, 4)?;
        op.run(None)?;

        let output = output.to_vec();
        assert_eq!(output[..4], [0; 4]);
        assert_eq!(output[4..], [255, 0, 195, 0]);
        op.delete()?;
        Ok(())
    }

    #[test]
    fn test_row_independence() -> Result<(), Box<dyn Error>> {
        let mut op = tanh(4)?;
        let output = Buffer::filled(8, 0);

        let input = Buffer::from(vec![127, 127, 127, 127, 130, 140, 150, 160]);
        op.setup(2, &input, 4, &output, 4)?;
        op.run(None)?;
        let second = output.to_vec()[4..].to_vec();

        input.write()[..4].copy_from_slice(&[0, 255, 1, 254]);
        op.run(None)?;
        assert_eq!(output.to_vec()[4..], second);
        Ok(())
    }

    #[test]
    fn test_strided_padding_untouched() -> Result<(), Box<dyn Error>> {
        let (batch, channels, input_stride, output_stride) = (5, 3, 7, 4);
        let mut op = tanh(channels)?;
        let input = random_buffer((batch - 1) * input_stride + channels);
        let output = Buffer::filled(batch * output_stride, 0xA5);
        op.setup(batch, &input, input_stride, &output, output_stride)?;
        op.run(None)?;

        let table = op.descriptor().ok_or("no descriptor")?.table().clone();
        let x = input.to_vec();
        let y = output.to_vec();
        for row in 0..batch {
            for col in 0..output_stride {
                let value = y[row * output_stride + col];
                if col < channels {
                    assert_eq!(value, table.get(x[row * input_stride + col]));
                } else {
                    assert_eq!(value, 0xA5);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_in_place() -> Result<(), Box<dyn Error>> {
        platform::initialize()?;
        let params = QuantizationParams::symmetric(128, 0.05);
        let mut op = Operator::create(&Identity, 2, params.with_output_range(120, 136), Flags::NONE)?;

        let data = Buffer::from(vec![0, 130, 0xEE, 255, 128, 0xEE]);
        op.setup(2, &data, 3, &data, 3)?;
        op.run(Some(&ScopedPool::new(2)))?;
        assert_eq!(data.to_vec(), [120, 130, 0xEE, 136, 128, 0xEE]);
        Ok(())
    }

    #[test]
    fn test_run_idempotent_across_pools() -> Result<(), Box<dyn Error>> {
        platform::initialize()?;
        let (batch, channels) = (333, 37);
        let params = QuantizationParams::new(100, 0.05, 60, 0.02).with_output_range(10, 250);
        let mut op = Operator::create(&HardSwish, channels, params, Flags::NONE)?;

        let input = random_buffer(batch * 40);
        let output = Buffer::filled(batch * 41, 0);
        op.setup(batch, &input, 40, &output, 41)?;

        op.run(None)?;
        let serial = output.to_vec();
        op.run(None)?;
        assert_eq!(output.to_vec(), serial);

        #[allow(unused_mut)]
        let mut pools: Vec<Box<dyn ThreadPool>> = vec![
            Box::new(ScopedPool::new(1)),
            Box::new(ScopedPool::new(3)),
            Box::new(ScopedPool::new(8)),
        ];
        #[cfg(feature = "rayon")]
        pools.push(Box::new(crate::loom::pool::GlobalPool));
        for pool in &pools {
            output.write().fill(0);
            op.run(Some(pool.as_ref()))?;
            assert_eq!(output.to_vec(), serial);
        }
        Ok(())
    }

    #[test]
    fn test_contiguous_parallel_matches_serial() -> Result<(), Box<dyn Error>> {
        let (batch, channels) = (1000, 16);
        let mut op = tanh(channels)?;
        let input = random_buffer(batch * channels);
        let serial = Buffer::filled(batch * channels, 0);
        let parallel = Buffer::filled(batch * channels, 0);

        op.setup(batch, &input, channels, &serial, channels)?;
        op.run(None)?;
        op.setup(batch, &input, channels, &parallel, channels)?;
        op.run(Some(&ScopedPool::new(4)))?;
        assert_eq!(serial.to_vec(), parallel.to_vec());

        let table = op.descriptor().ok_or("no descriptor")?.table().clone();
        let expected: Vec<_> = input.to_vec().into_iter().map(|x| table.get(x)).collect();
        assert_eq!(serial.to_vec(), expected);
        Ok(())
    }

    #[test]
    fn test_run_after_shrink() -> Result<(), Box<dyn Error>> {
        let mut op = tanh(4)?;
        let input = Buffer::filled(8, 127);
        let output = Buffer::filled(8, 0xA5);
        op.setup(2, &input, 4, &output, 4)?;

        output.write().truncate(5);
        assert_eq!(Status::from(&op.run(None)), Status::InvalidParameter);
        assert_eq!(output.to_vec(), [0xA5; 5]);
        Ok(())
    }

    #[test]
    fn test_concurrent_runs() -> Result<(), Box<dyn Error>> {
        let channels = 8;
        let mut ops = (0..4).map(|_| tanh(channels)).collect::<Result<Vec<_>, _>>()?;
        let outputs = (0..4)
            .map(|_| Buffer::filled(64 * channels, 0))
            .collect::<Vec<_>>();
        let input = random_buffer(64 * channels);

        for (op, output) in ops.iter_mut().zip(&outputs) {
            op.setup(64, &input, channels, output, channels)?;
        }

        std::thread::scope(|scope| {
            let handles: Vec<_> = ops
                .iter()
                .map(|op| scope.spawn(move || op.run(None)))
                .collect();
            handles
                .into_iter()
                .try_for_each(|handle| handle.join().expect("run panicked"))
        })?;

        let first = outputs[0].to_vec();
        assert!(outputs.iter().all(|output| output.to_vec() == first));
        Ok(())
    }
}
