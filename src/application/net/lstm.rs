use ndarray::{Array1, Array2, Ix1, Ix2, s};
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::adam::{AdamParams, AdamState};
use super::outer;

/// Single LSTM layer with fused gate weights.
///
/// Gate blocks are laid out `[input, forget, candidate, output]`, each
/// `hidden_size` rows of `w_x`/`w_h`/`b`. The forget-gate bias block starts
/// at 1.0 so early training does not flush cell state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmLayer {
    input_size: usize,
    hidden_size: usize,
    w_x: Array2<f64>,
    w_h: Array2<f64>,
    b: Array1<f64>,
    #[serde(skip)]
    cache: Option<LstmCache>,
    #[serde(skip)]
    grads: Option<LstmGrads>,
    #[serde(skip)]
    opt: Option<LstmOpt>,
}

/// Per-timestep activations kept from the forward pass for
/// backpropagation through time.
#[derive(Debug, Clone, Default)]
struct LstmCache {
    xs: Vec<Array1<f64>>,
    gate_i: Vec<Array1<f64>>,
    gate_f: Vec<Array1<f64>>,
    gate_g: Vec<Array1<f64>>,
    gate_o: Vec<Array1<f64>>,
    cells: Vec<Array1<f64>>,
    tanh_cells: Vec<Array1<f64>>,
    hiddens: Vec<Array1<f64>>,
}

#[derive(Debug, Clone)]
struct LstmGrads {
    w_x: Array2<f64>,
    w_h: Array2<f64>,
    b: Array1<f64>,
}

#[derive(Debug, Clone)]
struct LstmOpt {
    w_x: AdamState<Ix2>,
    w_h: AdamState<Ix2>,
    b: AdamState<Ix1>,
}

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

impl LstmLayer {
    pub fn new(input_size: usize, hidden_size: usize, rng: &mut StdRng) -> Self {
        let limit = (1.0 / hidden_size as f64).sqrt();
        let four_h = 4 * hidden_size;

        let mut b = Array1::zeros(four_h);
        b.slice_mut(s![hidden_size..2 * hidden_size]).fill(1.0);

        Self {
            input_size,
            hidden_size,
            w_x: Array2::from_shape_fn((four_h, input_size), |_| rng.random_range(-limit..limit)),
            w_h: Array2::from_shape_fn((four_h, hidden_size), |_| rng.random_range(-limit..limit)),
            b,
            cache: None,
            grads: None,
            opt: None,
        }
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Runs the whole sequence from zeroed states and returns the hidden
    /// state at every timestep. With `train` set, activations are cached
    /// for a following `backward_seq`.
    pub fn forward_seq(&mut self, xs: &[Array1<f64>], train: bool) -> Vec<Array1<f64>> {
        let hsz = self.hidden_size;
        let mut h = Array1::zeros(hsz);
        let mut c: Array1<f64> = Array1::zeros(hsz);
        let mut outputs = Vec::with_capacity(xs.len());
        let mut cache = if train { Some(LstmCache::default()) } else { None };

        for x in xs {
            let z = self.w_x.dot(x) + self.w_h.dot(&h) + &self.b;

            let i = z.slice(s![0..hsz]).mapv(sigmoid);
            let f = z.slice(s![hsz..2 * hsz]).mapv(sigmoid);
            let g = z.slice(s![2 * hsz..3 * hsz]).mapv(f64::tanh);
            let o = z.slice(s![3 * hsz..4 * hsz]).mapv(sigmoid);

            let c_next = &f * &c + &i * &g;
            let tanh_c = c_next.mapv(f64::tanh);
            let h_next = &o * &tanh_c;

            if let Some(cache) = &mut cache {
                cache.xs.push(x.clone());
                cache.gate_i.push(i);
                cache.gate_f.push(f);
                cache.gate_g.push(g);
                cache.gate_o.push(o);
                cache.cells.push(c_next.clone());
                cache.tanh_cells.push(tanh_c);
                cache.hiddens.push(h_next.clone());
            }

            c = c_next;
            h = h_next;
            outputs.push(h.clone());
        }

        if train {
            self.cache = cache;
        }
        outputs
    }

    /// Inference-only pass, no caching.
    pub fn infer_seq(&self, xs: &[Array1<f64>]) -> Vec<Array1<f64>> {
        let hsz = self.hidden_size;
        let mut h = Array1::zeros(hsz);
        let mut c: Array1<f64> = Array1::zeros(hsz);
        let mut outputs = Vec::with_capacity(xs.len());

        for x in xs {
            let z = self.w_x.dot(x) + self.w_h.dot(&h) + &self.b;

            let i = z.slice(s![0..hsz]).mapv(sigmoid);
            let f = z.slice(s![hsz..2 * hsz]).mapv(sigmoid);
            let g = z.slice(s![2 * hsz..3 * hsz]).mapv(f64::tanh);
            let o = z.slice(s![3 * hsz..4 * hsz]).mapv(sigmoid);

            c = &f * &c + &i * &g;
            h = &o * &c.mapv(f64::tanh);
            outputs.push(h.clone());
        }
        outputs
    }

    /// Backpropagation through time over the cached sequence.
    ///
    /// `dh_seq` carries the loss gradient with respect to this layer's
    /// output at each timestep. Weight gradients accumulate across calls
    /// until the next `step`; the return value is the gradient with respect
    /// to the inputs, timestep by timestep.
    pub fn backward_seq(&mut self, dh_seq: &[Array1<f64>]) -> Vec<Array1<f64>> {
        let hsz = self.hidden_size;
        let input_size = self.input_size;
        let Self {
            w_x,
            w_h,
            cache,
            grads,
            ..
        } = self;

        let cache = cache.take().expect("forward pass recorded before backward");
        let t_len = cache.xs.len();
        assert_eq!(dh_seq.len(), t_len, "output gradient per timestep");

        let grads = grads.get_or_insert_with(|| LstmGrads {
            w_x: Array2::zeros(w_x.raw_dim()),
            w_h: Array2::zeros(w_h.raw_dim()),
            b: Array1::zeros(4 * hsz),
        });

        let zero = Array1::zeros(hsz);
        let mut dxs = vec![Array1::zeros(input_size); t_len];
        let mut dh_next: Array1<f64> = Array1::zeros(hsz);
        let mut dc_next: Array1<f64> = Array1::zeros(hsz);

        for t in (0..t_len).rev() {
            let i = &cache.gate_i[t];
            let f = &cache.gate_f[t];
            let g = &cache.gate_g[t];
            let o = &cache.gate_o[t];
            let tanh_c = &cache.tanh_cells[t];
            let c_prev = if t > 0 { &cache.cells[t - 1] } else { &zero };
            let h_prev = if t > 0 { &cache.hiddens[t - 1] } else { &zero };

            let dh = &dh_seq[t] + &dh_next;

            let d_o = &dh * tanh_c;
            let mut dc = &dh * o * &tanh_c.mapv(|v| 1.0 - v * v);
            dc += &dc_next;

            let d_i = &dc * g;
            let d_f = &dc * c_prev;
            let d_g = &dc * i;

            let dz_i = &d_i * &i.mapv(|v| v * (1.0 - v));
            let dz_f = &d_f * &f.mapv(|v| v * (1.0 - v));
            let dz_g = &d_g * &g.mapv(|v| 1.0 - v * v);
            let dz_o = &d_o * &o.mapv(|v| v * (1.0 - v));

            let mut dz = Array1::zeros(4 * hsz);
            dz.slice_mut(s![0..hsz]).assign(&dz_i);
            dz.slice_mut(s![hsz..2 * hsz]).assign(&dz_f);
            dz.slice_mut(s![2 * hsz..3 * hsz]).assign(&dz_g);
            dz.slice_mut(s![3 * hsz..4 * hsz]).assign(&dz_o);

            grads.w_x += &outer(&dz, &cache.xs[t]);
            grads.w_h += &outer(&dz, h_prev);
            grads.b += &dz;

            dxs[t] = w_x.t().dot(&dz);
            dh_next = w_h.t().dot(&dz);
            dc_next = &dc * f;
        }

        dxs
    }

    /// Applies one Adam step over the accumulated gradients, then clears
    /// them. A step without accumulated gradients is a no-op.
    pub fn step(&mut self, hp: &AdamParams, step: u64) {
        if let Some(grads) = self.grads.take() {
            let opt = self.opt.get_or_insert_with(|| LstmOpt {
                w_x: AdamState::zeros_like(&self.w_x),
                w_h: AdamState::zeros_like(&self.w_h),
                b: AdamState::zeros_like(&self.b),
            });
            opt.w_x.update(&mut self.w_x, &grads.w_x, step, hp);
            opt.w_h.update(&mut self.w_h, &grads.w_h, step, hp);
            opt.b.update(&mut self.b, &grads.b, step, hp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;
    use rand::SeedableRng;

    fn toy_sequence() -> Vec<Array1<f64>> {
        vec![
            arr1(&[0.3, -0.1]),
            arr1(&[0.05, 0.4]),
            arr1(&[-0.2, 0.2]),
            arr1(&[0.1, -0.3]),
        ]
    }

    /// Scalar loss used for the checks below: sum of every hidden unit at
    /// every timestep, so the output gradient is all ones.
    fn loss(layer: &LstmLayer, xs: &[Array1<f64>]) -> f64 {
        layer.infer_seq(xs).iter().map(|h| h.sum()).sum()
    }

    #[test]
    fn test_forward_shapes_and_infer_agreement() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut layer = LstmLayer::new(2, 5, &mut rng);
        let xs = toy_sequence();

        let trained = layer.forward_seq(&xs, true);
        let inferred = layer.infer_seq(&xs);

        assert_eq!(trained.len(), xs.len());
        assert_eq!(trained[0].len(), 5);
        for (a, b) in trained.iter().zip(&inferred) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_bptt_weight_gradients_match_finite_difference() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut layer = LstmLayer::new(2, 3, &mut rng);
        let xs = toy_sequence();

        layer.forward_seq(&xs, true);
        let ones = vec![Array1::ones(3); xs.len()];
        layer.backward_seq(&ones);

        let hsz = 3;
        // One probe inside every gate block, plus recurrent weights and bias.
        let w_x_probes = [(0, 0), (hsz, 1), (2 * hsz + 1, 0), (3 * hsz + 2, 1)];
        let eps = 1e-6;

        for &(r, c) in &w_x_probes {
            let analytic = layer.grads.as_ref().unwrap().w_x[[r, c]];
            let original = layer.w_x[[r, c]];
            layer.w_x[[r, c]] = original + eps;
            let plus = loss(&layer, &xs);
            layer.w_x[[r, c]] = original - eps;
            let minus = loss(&layer, &xs);
            layer.w_x[[r, c]] = original;

            let numeric = (plus - minus) / (2.0 * eps);
            assert!(
                (analytic - numeric).abs() < 1e-5,
                "w_x[{r},{c}]: analytic {analytic} vs numeric {numeric}"
            );
        }

        for &(r, c) in &[(1, 0), (hsz + 2, 1), (3 * hsz, 2)] {
            let analytic = layer.grads.as_ref().unwrap().w_h[[r, c]];
            let original = layer.w_h[[r, c]];
            layer.w_h[[r, c]] = original + eps;
            let plus = loss(&layer, &xs);
            layer.w_h[[r, c]] = original - eps;
            let minus = loss(&layer, &xs);
            layer.w_h[[r, c]] = original;

            let numeric = (plus - minus) / (2.0 * eps);
            assert!(
                (analytic - numeric).abs() < 1e-5,
                "w_h[{r},{c}]: analytic {analytic} vs numeric {numeric}"
            );
        }

        for &r in &[0usize, hsz, 2 * hsz, 3 * hsz + 1] {
            let analytic = layer.grads.as_ref().unwrap().b[r];
            let original = layer.b[r];
            layer.b[r] = original + eps;
            let plus = loss(&layer, &xs);
            layer.b[r] = original - eps;
            let minus = loss(&layer, &xs);
            layer.b[r] = original;

            let numeric = (plus - minus) / (2.0 * eps);
            assert!(
                (analytic - numeric).abs() < 1e-5,
                "b[{r}]: analytic {analytic} vs numeric {numeric}"
            );
        }
    }

    #[test]
    fn test_bptt_input_gradients_match_finite_difference() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut layer = LstmLayer::new(2, 3, &mut rng);
        let xs = toy_sequence();

        layer.forward_seq(&xs, true);
        let ones = vec![Array1::ones(3); xs.len()];
        let dxs = layer.backward_seq(&ones);

        let eps = 1e-6;
        for t in 0..xs.len() {
            for idx in 0..2 {
                let mut plus = xs.clone();
                plus[t][idx] += eps;
                let mut minus = xs.clone();
                minus[t][idx] -= eps;

                let numeric = (loss(&layer, &plus) - loss(&layer, &minus)) / (2.0 * eps);
                assert!(
                    (dxs[t][idx] - numeric).abs() < 1e-5,
                    "dx[{t}][{idx}]: analytic {} vs numeric {numeric}",
                    dxs[t][idx]
                );
            }
        }
    }

    #[test]
    fn test_serde_round_trip_preserves_inference() {
        let mut rng = StdRng::seed_from_u64(6);
        let layer = LstmLayer::new(2, 4, &mut rng);
        let xs = toy_sequence();

        let json = serde_json::to_string(&layer).unwrap();
        let restored: LstmLayer = serde_json::from_str(&json).unwrap();

        let a = layer.infer_seq(&xs);
        let b = restored.infer_seq(&xs);
        assert_eq!(a, b);
    }
}
