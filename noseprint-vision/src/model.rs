use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use ndarray::Array4;
use ort::{
    ep::{self, ExecutionProvider},
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session,
    },
    value::Value,
};

use crate::error::{VisionError, VisionResult};

/// One output tensor, flattened.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorOutput {
    pub shape: Vec<i64>,
    pub data: Vec<f32>,
}

impl TensorOutput {
    pub fn new(shape: Vec<i64>, data: Vec<f32>) -> Self {
        Self { shape, data }
    }
}

/// A loaded network that maps one NHWC input tensor to its outputs.
///
/// Implementations are not expected to support concurrent invocation;
/// [`ModelSlot`] serializes calls.
pub trait InferenceModel: Send {
    fn run(&mut self, input: Array4<f32>) -> Result<Vec<TensorOutput>>;
}

pub fn session_builder(num_threads: usize) -> Result<SessionBuilder> {
    let mut builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(ort::Error::<()>::from)?
        .with_intra_threads(num_threads)
        .map_err(ort::Error::<()>::from)?;

    #[cfg(feature = "openvino")]
    {
        let ep = ep::OpenVINO::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("openvino feature is enabled, onnx runtime not compiled with openvino")
        }
    }

    #[cfg(feature = "cuda")]
    {
        let ep = ep::CUDA::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("cuda feature is enabled, onnx runtime not compiled with cuda")
        }
    }

    Ok(builder)
}

/// ONNX Runtime backed model.
pub struct OrtModel {
    session: Session,
}

impl OrtModel {
    pub fn load(path: &Path, num_threads: usize) -> Result<Self> {
        let session = session_builder(num_threads)?
            .commit_from_file(path)
            .with_context(|| format!("load model {}", path.display()))?;
        Ok(Self { session })
    }

    /// Boxed loader, for use with [`ModelSlot::load`].
    pub fn boxed(path: &Path, num_threads: usize) -> Result<Box<dyn InferenceModel>> {
        Ok(Box::new(Self::load(path, num_threads)?))
    }
}

impl InferenceModel for OrtModel {
    fn run(&mut self, input: Array4<f32>) -> Result<Vec<TensorOutput>> {
        let input_tensor = Value::from_array(input)?;
        let outputs = self.session.run(ort::inputs![input_tensor])?;

        let mut output_data = Vec::new();
        for (_name, output) in outputs.iter() {
            let (shape, data) = output.try_extract_tensor::<f32>()?;
            output_data.push(TensorOutput::new(
                shape.iter().copied().collect(),
                data.to_vec(),
            ));
        }
        Ok(output_data)
    }
}

enum SlotState {
    Unloaded,
    Loaded(Box<dyn InferenceModel>),
    Closed,
}

/// Owns one model instance and its lifecycle: `Unloaded -> Loaded -> Closed`.
///
/// Loading and inference take two independent locks. A load builds the new
/// model under `load_lock` only and then waits for the run lock to swap it
/// in, so a swap never happens while an inference is in flight. `Closed` is
/// terminal.
pub struct ModelSlot {
    name: &'static str,
    load_lock: Mutex<()>,
    state: Mutex<SlotState>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ModelSlot {
    pub fn empty(name: &'static str) -> Self {
        Self {
            name,
            load_lock: Mutex::new(()),
            state: Mutex::new(SlotState::Unloaded),
        }
    }

    pub fn with_model(name: &'static str, model: Box<dyn InferenceModel>) -> Self {
        Self {
            name,
            load_lock: Mutex::new(()),
            state: Mutex::new(SlotState::Loaded(model)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Build a model with `factory` and install it, replacing any previous one.
    pub fn load<F>(&self, factory: F) -> VisionResult<()>
    where
        F: FnOnce() -> Result<Box<dyn InferenceModel>>,
    {
        let _loading = lock(&self.load_lock);
        if matches!(*lock(&self.state), SlotState::Closed) {
            return Err(VisionError::ModelUnavailable(format!(
                "{} is closed",
                self.name
            )));
        }

        let model = factory().map_err(|e| {
            log::error!("{}: failed to load model: {:#}", self.name, e);
            VisionError::ModelUnavailable(format!("{}: {:#}", self.name, e))
        })?;

        let mut state = lock(&self.state);
        if matches!(*state, SlotState::Closed) {
            return Err(VisionError::ModelUnavailable(format!(
                "{} closed while loading",
                self.name
            )));
        }
        *state = SlotState::Loaded(model);
        log::info!("{}: model loaded", self.name);
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        matches!(*lock(&self.state), SlotState::Loaded(_))
    }

    /// Run one inference. Holds the run lock for the whole call.
    pub fn infer(&self, input: Array4<f32>) -> VisionResult<Vec<TensorOutput>> {
        let mut state = lock(&self.state);
        match &mut *state {
            SlotState::Loaded(model) => model.run(input).map_err(|e| {
                log::error!("{}: inference error: {:#}", self.name, e);
                VisionError::InferenceFailed(format!("{}: {:#}", self.name, e))
            }),
            SlotState::Unloaded => Err(VisionError::ModelUnavailable(format!(
                "{} not loaded",
                self.name
            ))),
            SlotState::Closed => Err(VisionError::ModelUnavailable(format!(
                "{} is closed",
                self.name
            ))),
        }
    }

    /// Release the model. Waits for any in-flight inference.
    pub fn close(&self) {
        let mut state = lock(&self.state);
        if matches!(*state, SlotState::Loaded(_)) {
            log::debug!("{}: releasing model", self.name);
        }
        *state = SlotState::Closed;
    }
}
