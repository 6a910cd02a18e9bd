use super::{InferenceBackend, InputKind, ModelInput, RawOutput};
use crate::loader::plan::extension_of;
use ndarray::{ArrayD, IxDyn};
use std::path::Path;
use tensorflow::{
    Graph, ImportGraphDefOptions, Operation, SavedModelBundle, Session, SessionOptions,
    SessionRunArgs, Tensor,
};

const SERVING_TAG: &str = "serve";
const SERVING_SIGNATURE: &str = "serving_default";
const SAVED_MODEL_FILE: &str = "saved_model.pb";

/// Keras SavedModel or frozen TensorFlow graph.
///
/// The shared tensor is NCHW; Keras models expect NHWC, so the input is
/// transposed before feeding.
pub struct KerasBackend {
    session: Session,
    input: (Operation, i32),
    output: (Operation, i32),
    // Keeps the graph alive for the operations above
    _graph: Graph,
}

impl KerasBackend {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        match extension_of(path).as_deref() {
            Some("h5") => anyhow::bail!(
                "Keras .h5 archives cannot be executed directly; export the model as a SavedModel"
            ),
            _ if path.file_name().is_some_and(|name| name == SAVED_MODEL_FILE) => {
                let dir = path
                    .parent()
                    .ok_or_else(|| anyhow::anyhow!("saved_model.pb has no parent directory"))?;
                Self::load_saved_model(dir)
            }
            _ => Self::load_frozen_graph(path),
        }
    }

    fn load_saved_model(dir: &Path) -> anyhow::Result<Self> {
        let mut graph = Graph::new();
        let bundle =
            SavedModelBundle::load(&SessionOptions::new(), [SERVING_TAG], &mut graph, dir)?;

        let signature = bundle.meta_graph_def().get_signature(SERVING_SIGNATURE)?;
        let input_info = signature
            .inputs()
            .values()
            .next()
            .ok_or_else(|| anyhow::anyhow!("signature {SERVING_SIGNATURE} has no inputs"))?;
        let output_info = signature
            .outputs()
            .values()
            .next()
            .ok_or_else(|| anyhow::anyhow!("signature {SERVING_SIGNATURE} has no outputs"))?;

        let input = (
            graph.operation_by_name_required(&input_info.name().name)?,
            input_info.name().index,
        );
        let output = (
            graph.operation_by_name_required(&output_info.name().name)?,
            output_info.name().index,
        );

        tracing::info!(path = %dir.display(), "SavedModel loaded");
        Ok(Self {
            session: bundle.session,
            input,
            output,
            _graph: graph,
        })
    }

    /// Frozen graphs carry no signature: the first placeholder is the input and
    /// the last operation is the output.
    fn load_frozen_graph(path: &Path) -> anyhow::Result<Self> {
        let proto = std::fs::read(path)?;
        let mut graph = Graph::new();
        graph.import_graph_def(&proto, &ImportGraphDefOptions::new())?;

        let mut input = None;
        let mut output = None;
        for op in graph.operation_iter() {
            if input.is_none() && op.op_type()? == "Placeholder" {
                input = Some(op.clone());
            }
            output = Some(op);
        }
        let input = input.ok_or_else(|| anyhow::anyhow!("graph has no placeholder input"))?;
        let output = output.ok_or_else(|| anyhow::anyhow!("graph has no operations"))?;

        let session = Session::new(&SessionOptions::new(), &graph)?;

        tracing::info!(
            path = %path.display(),
            input = %input.name()?,
            output = %output.name()?,
            "Frozen graph loaded"
        );
        Ok(Self {
            session,
            input: (input, 0),
            output: (output, 0),
            _graph: graph,
        })
    }
}

impl InferenceBackend for KerasBackend {
    fn input_kind(&self) -> InputKind {
        InputKind::Tensor
    }

    fn infer(&mut self, input: ModelInput<'_>) -> anyhow::Result<RawOutput> {
        let ModelInput::Tensor(view) = input else {
            anyhow::bail!("Keras graph expects a preprocessed tensor");
        };
        if view.ndim() != 4 {
            anyhow::bail!("expected a [1, 3, H, W] tensor, got {:?}", view.shape());
        }

        let nhwc = view.permuted_axes(IxDyn(&[0, 2, 3, 1]));
        let dims: Vec<u64> = nhwc.shape().iter().map(|&d| d as u64).collect();
        let data: Vec<f32> = nhwc.iter().copied().collect();
        let tensor = Tensor::<f32>::new(&dims).with_values(&data)?;

        let mut args = SessionRunArgs::new();
        args.add_feed(&self.input.0, self.input.1, &tensor);
        let token = args.request_fetch(&self.output.0, self.output.1);
        self.session.run(&mut args)?;

        let result: Tensor<f32> = args.fetch(token)?;
        let shape: Vec<usize> = result.dims().iter().map(|&d| d as usize).collect();
        let output = ArrayD::from_shape_vec(IxDyn(&shape), result.to_vec())?;

        Ok(RawOutput::from_tensor(output)?)
    }
}
