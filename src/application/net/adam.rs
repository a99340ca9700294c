use ndarray::{Array, Dimension, Zip};

/// Adam hyperparameters, shared by every parameter tensor of a model.
#[derive(Debug, Clone, Copy)]
pub struct AdamParams {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
}

impl Default for AdamParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

/// First and second moment estimates for one parameter tensor.
#[derive(Debug, Clone)]
pub struct AdamState<D: Dimension> {
    m: Array<f64, D>,
    v: Array<f64, D>,
}

impl<D: Dimension> AdamState<D> {
    pub fn zeros_like(param: &Array<f64, D>) -> Self {
        Self {
            m: Array::zeros(param.raw_dim()),
            v: Array::zeros(param.raw_dim()),
        }
    }

    /// One bias-corrected Adam update. `step` is 1-based and shared across
    /// all tensors updated in the same optimizer step.
    pub fn update(
        &mut self,
        param: &mut Array<f64, D>,
        grad: &Array<f64, D>,
        step: u64,
        hp: &AdamParams,
    ) {
        self.m
            .zip_mut_with(grad, |m, &g| *m = hp.beta1 * *m + (1.0 - hp.beta1) * g);
        self.v
            .zip_mut_with(grad, |v, &g| *v = hp.beta2 * *v + (1.0 - hp.beta2) * g * g);

        let correction1 = 1.0 - hp.beta1.powi(step as i32);
        let correction2 = 1.0 - hp.beta2.powi(step as i32);

        Zip::from(param).and(&self.m).and(&self.v).for_each(|p, &m, &v| {
            let m_hat = m / correction1;
            let v_hat = v / correction2;
            *p -= hp.learning_rate * m_hat / (v_hat.sqrt() + hp.epsilon);
        });
    }
}
