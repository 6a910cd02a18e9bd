use super::{InferenceBackend, InputKind, ModelInput, RawOutput};
use ndarray::{ArrayD, ArrayViewD, IxDyn};
use std::path::Path;
use tch::{CModule, Device, IValue, Kind, Tensor};

/// Copies an ndarray view into a CPU tensor with the same shape.
pub(crate) fn to_tensor(view: ArrayViewD<'_, f32>) -> anyhow::Result<Tensor> {
    let shape: Vec<i64> = view.shape().iter().map(|&d| d as i64).collect();
    let data: Vec<f32> = view.iter().copied().collect();
    Ok(Tensor::from_slice(&data).view(shape.as_slice()))
}

/// Copies a tensor back into an ndarray, converting to `f32`.
pub(crate) fn to_array(tensor: &Tensor) -> anyhow::Result<ArrayD<f32>> {
    let tensor = tensor.to_device(Device::Cpu).to_kind(Kind::Float).contiguous();
    let shape: Vec<usize> = tensor.size().iter().map(|&d| d as usize).collect();
    let data = Vec::<f32>::try_from(&tensor.flatten(0, -1))?;
    Ok(ArrayD::from_shape_vec(IxDyn(&shape), data)?)
}

/// First tensor of a module's return value (plain tensor or tuple/list head).
pub(crate) fn first_tensor(value: IValue) -> anyhow::Result<Tensor> {
    match value {
        IValue::Tensor(tensor) => Ok(tensor),
        IValue::Tuple(items) | IValue::GenericList(items) => items
            .into_iter()
            .next()
            .map(first_tensor)
            .unwrap_or_else(|| Err(anyhow::anyhow!("module returned an empty sequence"))),
        IValue::TensorList(tensors) => tensors
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("module returned an empty tensor list")),
        _ => anyhow::bail!("module returned a non-tensor value"),
    }
}

pub(crate) fn load_module(path: &Path) -> anyhow::Result<CModule> {
    let mut module = CModule::load(path)?;
    module.set_eval();
    Ok(module)
}

/// A whole serialized TorchScript model.
pub struct TorchBackend {
    module: CModule,
}

impl TorchBackend {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let module = load_module(path)?;
        tracing::info!(path = %path.display(), "TorchScript module loaded");
        Ok(Self { module })
    }
}

impl InferenceBackend for TorchBackend {
    fn input_kind(&self) -> InputKind {
        InputKind::Tensor
    }

    fn infer(&mut self, input: ModelInput<'_>) -> anyhow::Result<RawOutput> {
        let ModelInput::Tensor(view) = input else {
            anyhow::bail!("TorchScript module expects a preprocessed tensor");
        };

        let input = to_tensor(view)?;
        let output = tch::no_grad(|| self.module.forward_is(&[IValue::Tensor(input)]))?;
        let output = to_array(&first_tensor(output)?)?;

        Ok(RawOutput::from_tensor(output)?)
    }
}

/// Named parameter tensors without an architecture to run them.
///
/// Loading succeeds so the handle reports what was found; every inference call
/// fails until the model is exported as TorchScript.
pub struct StateDictBackend {
    parameters: Vec<(String, Tensor)>,
}

impl StateDictBackend {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let parameters = Tensor::load_multi(path)?;
        if parameters.is_empty() {
            anyhow::bail!("state dict contains no tensors");
        }

        tracing::warn!(
            path = %path.display(),
            tensors = parameters.len(),
            "Loaded a parameter dictionary without an architecture; predictions will fail"
        );
        Ok(Self { parameters })
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|(name, _)| name.as_str())
    }
}

impl InferenceBackend for StateDictBackend {
    fn input_kind(&self) -> InputKind {
        InputKind::Tensor
    }

    fn infer(&mut self, _input: ModelInput<'_>) -> anyhow::Result<RawOutput> {
        anyhow::bail!(
            "model is a state dict of {} tensors with no architecture attached; export it with torch.jit.save",
            self.parameters.len()
        )
    }
}
