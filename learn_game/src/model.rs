use crate::board::CELLS;
use anyhow::Context;
use burn::backend::{Autodiff, NdArray};
use burn::module::AutodiffModule;
use burn::nn::loss::{MseLoss, Reduction};
use burn::nn::{Linear, LinearConfig, Relu};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::DefaultRecorder;
use burn::tensor::{ElementConversion, TensorData};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

pub type InferBackend = NdArray<f32>;
pub type TrainBackend = Autodiff<InferBackend>;

/// Maps board vectors (one per row) to nine action scores.
pub trait QModel: fmt::Debug {
    fn evaluate(&self, states: ArrayView2<f32>) -> Array2<f32>;

    /// One gradient step on the mean squared error between the model output
    /// for `states` and `targets`. Returns the loss before the step.
    fn fit(&mut self, states: ArrayView2<f32>, targets: ArrayView2<f32>) -> f32;

    fn evaluate_one(&self, state: ArrayView1<f32>) -> Array1<f32> {
        self.evaluate(state.insert_axis(Axis(0))).row(0).to_owned()
    }

    fn version(&self) -> Option<ModelVersion> {
        None
    }

    fn parameter_count(&self) -> usize {
        0
    }

    /// Writes the parameters next to `path`; the file extension is chosen by
    /// the model.
    fn save_to(&self, _path: &Path) -> anyhow::Result<()> {
        anyhow::bail!("{:?} cannot be persisted", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelVersion {
    V1,
    V2,
}

impl ModelVersion {
    pub fn layer_sizes(self) -> Vec<usize> {
        match self {
            ModelVersion::V1 => vec![CELLS, CELLS * 32, CELLS * 16, CELLS],
            ModelVersion::V2 => vec![CELLS, CELLS * 16, CELLS * 32, CELLS * 16, CELLS],
        }
    }
    pub fn default_tag(self) -> &'static str {
        match self {
            ModelVersion::V1 => "nn_agent_v1",
            ModelVersion::V2 => "nn_agent_v2",
        }
    }
}

/// Fully connected ReLU network with a linear output layer.
#[derive(Module, Debug)]
pub struct QNetwork<B: Backend> {
    layers: Vec<Linear<B>>,
    relu: Relu,
}

impl<B: Backend> QNetwork<B> {
    pub fn new(layer_sizes: &[usize], device: &B::Device) -> Self {
        QNetwork {
            layers: layer_sizes
                .windows(2)
                .map(|w| LinearConfig::new(w[0], w[1]).init(device))
                .collect(),
            relu: Relu::new(),
        }
    }

    /// Input [batch, 9] -> output [batch, 9] action scores.
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let last = self.layers.len() - 1;
        let mut x = input;
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(x);
            if i < last {
                x = self.relu.forward(x);
            }
        }
        x
    }
}

fn to_tensor<B: Backend>(rows: ArrayView2<f32>, device: &B::Device) -> Tensor<B, 2> {
    let shape = [rows.nrows(), rows.ncols()];
    let values = rows.iter().copied().collect::<Vec<f32>>();
    Tensor::from_data(TensorData::new(values, shape), device)
}

/// [`QNetwork`] trained with Adam on the autodiff ndarray backend.
pub struct Mlp {
    version: ModelVersion,
    learning_rate: f32,
    network: QNetwork<TrainBackend>,
    optimizer: OptimizerAdaptor<Adam, QNetwork<TrainBackend>, TrainBackend>,
    device: <TrainBackend as Backend>::Device,
}

impl fmt::Debug for Mlp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mlp")
            .field("version", &self.version)
            .field("learning_rate", &self.learning_rate)
            .field("parameters", &self.network.num_params())
            .finish()
    }
}

impl Mlp {
    pub fn new(version: ModelVersion, learning_rate: f32) -> Self {
        let device = Default::default();
        let network = QNetwork::new(&version.layer_sizes(), &device);
        Self::with_network(version, learning_rate, network, device)
    }

    fn with_network(
        version: ModelVersion,
        learning_rate: f32,
        network: QNetwork<TrainBackend>,
        device: <TrainBackend as Backend>::Device,
    ) -> Self {
        Mlp {
            version,
            learning_rate,
            network,
            optimizer: AdamConfig::new().init(),
            device,
        }
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    /// Restores parameters written by [`QModel::save_to`]. The optimiser starts fresh.
    pub fn load(path: &Path, version: ModelVersion, learning_rate: f32) -> anyhow::Result<Self> {
        let device = Default::default();
        let network = QNetwork::new(&version.layer_sizes(), &device)
            .load_file(path.to_path_buf(), &DefaultRecorder::default(), &device)
            .with_context(|| format!("loading model parameters from {}", path.display()))?;
        Ok(Self::with_network(version, learning_rate, network, device))
    }
}

impl QModel for Mlp {
    fn evaluate(&self, states: ArrayView2<f32>) -> Array2<f32> {
        let n = states.nrows();
        if n == 0 {
            return Array2::zeros((0, CELLS));
        }
        let input = to_tensor::<InferBackend>(states, &self.device);
        let scores = self
            .network
            .valid()
            .forward(input)
            .into_data()
            .to_vec::<f32>()
            .expect("f32 tensor data extraction");
        Array2::from_shape_vec((n, CELLS), scores).expect("network output is [batch, 9]")
    }

    fn fit(&mut self, states: ArrayView2<f32>, targets: ArrayView2<f32>) -> f32 {
        assert_eq!(
            states.nrows(),
            targets.nrows(),
            "state count and target count differ"
        );
        assert_eq!(states.ncols(), CELLS, "states must have one column per cell");
        assert_eq!(targets.ncols(), CELLS, "targets must have one column per cell");

        let input = to_tensor::<TrainBackend>(states, &self.device);
        let target = to_tensor::<TrainBackend>(targets, &self.device);
        let loss = MseLoss::new().forward(self.network.forward(input), target, Reduction::Mean);
        let loss_value = loss.clone().into_scalar().elem::<f32>();

        let grads = GradientsParams::from_grads(loss.backward(), &self.network);
        self.network = self.optimizer.step(
            f64::from(self.learning_rate),
            self.network.clone(),
            grads,
        );
        loss_value
    }

    fn version(&self) -> Option<ModelVersion> {
        Some(self.version)
    }

    fn parameter_count(&self) -> usize {
        self.network.num_params()
    }

    fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.network
            .clone()
            .valid()
            .save_file(path.to_path_buf(), &DefaultRecorder::default())
            .with_context(|| format!("saving model parameters to {}", path.display()))?;
        Ok(())
    }
}

/// Index of the highest score; the first one wins ties.
pub fn argmax(scores: ArrayView1<f32>) -> usize {
    let mut best = 0;
    for (i, &score) in scores.iter().enumerate() {
        if score > scores[best] {
            best = i;
        }
    }
    best
}
