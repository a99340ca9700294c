use ndarray::{Array1, Array2, Ix1, Ix2};
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::adam::{AdamParams, AdamState};
use super::outer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    ReLU,
    Linear,
}

impl Activation {
    fn apply(self, z: f64) -> f64 {
        match self {
            Activation::ReLU => z.max(0.0),
            Activation::Linear => z,
        }
    }

    fn derivative(self, z: f64) -> f64 {
        match self {
            Activation::ReLU => {
                if z > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Linear => 1.0,
        }
    }
}

/// Fully connected layer over column vectors: `a = act(W x + b)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    weights: Array2<f64>,
    bias: Array1<f64>,
    activation: Activation,
    #[serde(skip)]
    cache: Option<DenseCache>,
    #[serde(skip)]
    grads: Option<DenseGrads>,
    #[serde(skip)]
    opt: Option<DenseOpt>,
}

#[derive(Debug, Clone)]
struct DenseCache {
    input: Array1<f64>,
    z: Array1<f64>,
}

#[derive(Debug, Clone)]
struct DenseGrads {
    weights: Array2<f64>,
    bias: Array1<f64>,
}

#[derive(Debug, Clone)]
struct DenseOpt {
    weights: AdamState<Ix2>,
    bias: AdamState<Ix1>,
}

impl DenseLayer {
    /// Xavier-initialized layer; biases start at zero.
    pub fn new(
        input_size: usize,
        output_size: usize,
        activation: Activation,
        rng: &mut StdRng,
    ) -> Self {
        let limit = (6.0 / (input_size + output_size) as f64).sqrt();
        Self {
            weights: Array2::from_shape_fn((output_size, input_size), |_| {
                rng.random_range(-limit..limit)
            }),
            bias: Array1::zeros(output_size),
            activation,
            cache: None,
            grads: None,
            opt: None,
        }
    }

    pub fn forward(&mut self, input: &Array1<f64>, train: bool) -> Array1<f64> {
        let z = self.weights.dot(input) + &self.bias;
        let out = z.mapv(|v| self.activation.apply(v));
        if train {
            self.cache = Some(DenseCache {
                input: input.clone(),
                z,
            });
        }
        out
    }

    pub fn infer(&self, input: &Array1<f64>) -> Array1<f64> {
        let z = self.weights.dot(input) + &self.bias;
        z.mapv(|v| self.activation.apply(v))
    }

    /// Accumulates weight/bias gradients for the cached forward pass and
    /// returns the gradient with respect to the layer input.
    pub fn backward(&mut self, output_grad: &Array1<f64>) -> Array1<f64> {
        let activation = self.activation;
        let Self {
            weights,
            cache,
            grads,
            ..
        } = self;
        let cache = cache.take().expect("forward pass recorded before backward");

        let mut dz = output_grad.clone();
        dz.zip_mut_with(&cache.z, |d, &z| *d *= activation.derivative(z));

        let grads = grads.get_or_insert_with(|| DenseGrads {
            weights: Array2::zeros(weights.raw_dim()),
            bias: Array1::zeros(weights.nrows()),
        });
        grads.weights += &outer(&dz, &cache.input);
        grads.bias += &dz;

        weights.t().dot(&dz)
    }

    /// Applies one Adam step over the accumulated gradients, then clears
    /// them. A step without accumulated gradients is a no-op.
    pub fn step(&mut self, hp: &AdamParams, step: u64) {
        if let Some(grads) = self.grads.take() {
            let opt = self.opt.get_or_insert_with(|| DenseOpt {
                weights: AdamState::zeros_like(&self.weights),
                bias: AdamState::zeros_like(&self.bias),
            });
            opt.weights.update(&mut self.weights, &grads.weights, step, hp);
            opt.bias.update(&mut self.bias, &grads.bias, step, hp);
        }
    }
}
