//! Dense feed-forward network: a stack of fully-connected layers with a
//! configurable activation, analytical forward/backward passes, and
//! gradient buffers mirroring the weight layout (one `DenseGrads` per
//! `DenseLayer`), the same shape-matching convention laid out for
//! transformer layer gradients elsewhere in this crate's lineage.

use super::linalg;
use super::simd;
use crate::config::NetworkConfig;
use crate::rng::Xorshift64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Relu,
    Sigmoid,
    Tanh,
    Linear,
}

impl Activation {
    #[inline]
    fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Relu => linalg::relu(x),
            Activation::Sigmoid => linalg::sigmoid(x),
            Activation::Tanh => linalg::tanh_act(x),
            Activation::Linear => x,
        }
    }

    /// Derivative with respect to the pre-activation `z`, given the
    /// already-computed output `y = apply(z)` (cheaper for sigmoid/tanh).
    #[inline]
    fn prime(self, z: f32, y: f32) -> f32 {
        match self {
            Activation::Relu => linalg::relu_prime(z),
            Activation::Sigmoid => linalg::sigmoid_prime_from_output(y),
            Activation::Tanh => linalg::tanh_prime_from_output(y),
            Activation::Linear => 1.0,
        }
    }
}

/// One fully-connected layer: `y = activation(W x + b)`, `W` stored
/// row-major as `[out_size * in_size]`.
pub struct DenseLayer {
    pub in_size: usize,
    pub out_size: usize,
    pub activation: Activation,
    pub weights: Vec<f32>,
    pub biases: Vec<f32>,
}

/// Gradient accumulators shaped exactly like `DenseLayer`'s weights/biases.
pub struct DenseGrads {
    pub d_weights: Vec<f32>,
    pub d_biases: Vec<f32>,
}

impl DenseGrads {
    pub fn for_layer(layer: &DenseLayer) -> Self {
        DenseGrads {
            d_weights: vec![0.0; layer.weights.len()],
            d_biases: vec![0.0; layer.biases.len()],
        }
    }

    pub fn zero(&mut self) {
        for v in self.d_weights.iter_mut() {
            *v = 0.0;
        }
        for v in self.d_biases.iter_mut() {
            *v = 0.0;
        }
    }

    pub fn grad_norm(&self) -> f32 {
        let ws: f32 = self.d_weights.iter().map(|v| v * v).sum();
        let bs: f32 = self.d_biases.iter().map(|v| v * v).sum();
        (ws + bs).sqrt()
    }
}

impl DenseLayer {
    pub fn new(in_size: usize, out_size: usize, activation: Activation, rng: &mut Xorshift64) -> Self {
        let scale = 1.0 / (in_size as f32).sqrt();
        let mut weights = vec![0.0f32; out_size * in_size];
        rng.fill_scaled(&mut weights, scale);
        DenseLayer { in_size, out_size, activation, weights, biases: vec![0.0; out_size] }
    }

    /// Forward pass. Writes pre-activations into `z_out` and activated
    /// outputs into `y_out` (both length `out_size`) so `backward` can
    /// reuse them without recomputation.
    pub fn forward(&self, input: &[f32], z_out: &mut [f32], y_out: &mut [f32]) {
        simd::matvec(z_out, &self.weights, input, self.in_size, self.out_size);
        for i in 0..self.out_size {
            z_out[i] += self.biases[i];
            y_out[i] = self.activation.apply(z_out[i]);
        }
    }

    /// Backward pass given `grad_output` (`dL/dy`, length `out_size`).
    /// Accumulates into `grads` and writes `dL/dx` into `grad_input`
    /// (length `in_size`); callers chain layers by feeding `grad_input`
    /// into the previous layer's `grad_output`.
    pub fn backward(
        &self,
        input: &[f32],
        z: &[f32],
        y: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        grads: &mut DenseGrads,
        delta_scratch: &mut [f32],
    ) {
        let delta = &mut delta_scratch[..self.out_size];
        for i in 0..self.out_size {
            delta[i] = grad_output[i] * self.activation.prime(z[i], y[i]);
        }
        simd::outer_product_accum(&mut grads.d_weights, delta, input, self.out_size, self.in_size);
        simd::vec_add_inplace(&mut grads.d_biases, delta);
        for v in grad_input.iter_mut() {
            *v = 0.0;
        }
        simd::matvec_transpose_accum(grad_input, &self.weights, delta, self.in_size, self.out_size);
    }

    /// Apply a plain SGD step: `w -= lr * dw`.
    pub fn apply_gradients(&mut self, grads: &DenseGrads, learning_rate: f32) {
        for (w, g) in self.weights.iter_mut().zip(grads.d_weights.iter()) {
            *w -= learning_rate * g;
        }
        for (b, g) in self.biases.iter_mut().zip(grads.d_biases.iter()) {
            *b -= learning_rate * g;
        }
    }
}

/// A backward-pass target: a one-hot class label for a softmax output, or
/// an explicit target vector for a plain regression output.
pub enum Target<'a> {
    Label(usize),
    Vector(&'a [f32]),
}

/// A stack of `DenseLayer`s composed left-to-right, with an optional
/// softmax applied to the final layer's output for classification.
/// Forward/backward reuse pre-allocated per-layer scratch buffers so a
/// steady-state training loop does no further heap allocation.
pub struct Network {
    pub layers: Vec<DenseLayer>,
    pub softmax_output: bool,
    input_cache: Vec<f32>,
    z: Vec<Vec<f32>>,
    y: Vec<Vec<f32>>,
    grad: Vec<Vec<f32>>,
    grads: Vec<DenseGrads>,
    delta_scratch: Vec<f32>,
    learning_rate: f32,
}

impl Network {
    /// General constructor: an arbitrary number of hidden layers (all
    /// sharing `hidden_activation`) followed by one output layer.
    pub fn new_generic(
        input_size: usize,
        hidden_sizes: &[usize],
        output_size: usize,
        hidden_activation: Activation,
        output_activation: Activation,
        softmax_output: bool,
        learning_rate: f32,
        rng: &mut Xorshift64,
    ) -> Self {
        let mut layers = Vec::with_capacity(hidden_sizes.len() + 1);
        let mut prev = input_size;
        for &h in hidden_sizes {
            layers.push(DenseLayer::new(prev, h, hidden_activation, rng));
            prev = h;
        }
        layers.push(DenseLayer::new(prev, output_size, output_activation, rng));

        let max_width = layers.iter().map(|l| l.out_size).max().unwrap_or(0);
        let z = layers.iter().map(|l| vec![0.0; l.out_size]).collect();
        let y = layers.iter().map(|l| vec![0.0; l.out_size]).collect();
        let grad = layers.iter().map(|l| vec![0.0; l.in_size]).collect();
        let grads = layers.iter().map(DenseGrads::for_layer).collect();
        let input_cache = vec![0.0; input_size];

        Network { layers, softmax_output, input_cache, z, y, grad, grads, delta_scratch: vec![0.0; max_width], learning_rate }
    }

    /// Matches the literal external two-hidden-layer entry point: ReLU
    /// hidden layers, linear output (softmax applied separately if
    /// `softmax_output`).
    pub fn init_network(input_size: usize, h1: usize, h2: usize, output_size: usize, softmax_output: bool, learning_rate: f32, rng: &mut Xorshift64) -> Self {
        Network::new_generic(input_size, &[h1, h2], output_size, Activation::Relu, Activation::Linear, softmax_output, learning_rate, rng)
    }

    /// `init_network` reading its learning rate from a shared `NetworkConfig`.
    pub fn from_config(input_size: usize, h1: usize, h2: usize, output_size: usize, softmax_output: bool, config: &NetworkConfig, rng: &mut Xorshift64) -> Self {
        Network::init_network(input_size, h1, h2, output_size, softmax_output, config.learning_rate, rng)
    }

    pub fn output_size(&self) -> usize {
        self.layers.last().map(|l| l.out_size).unwrap_or(0)
    }

    /// Total scalar parameter count across every layer's weights and
    /// biases, in the same layer order `flatten_parameters`/
    /// `unflatten_parameters` use. The flat index space this defines is
    /// what Elastic Weight Consolidation's Fisher matrix and anchor
    /// weights are indexed against.
    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|l| l.weights.len() + l.biases.len()).sum()
    }

    /// Activated outputs of `layer` from the last `forward` call.
    pub fn layer_output(&self, layer: usize) -> &[f32] {
        &self.y[layer]
    }

    /// Flatten every layer's weights then biases, in layer order, into
    /// `out` (length must be `parameter_count()`).
    pub fn flatten_parameters_into(&self, out: &mut [f32]) {
        let mut offset = 0;
        for layer in &self.layers {
            out[offset..offset + layer.weights.len()].copy_from_slice(&layer.weights);
            offset += layer.weights.len();
            out[offset..offset + layer.biases.len()].copy_from_slice(&layer.biases);
            offset += layer.biases.len();
        }
    }

    pub fn flatten_parameters(&self) -> Vec<f32> {
        let mut out = vec![0.0; self.parameter_count()];
        self.flatten_parameters_into(&mut out);
        out
    }

    /// Inverse of `flatten_parameters`: write `flat` back into each layer's
    /// weights and biases in the same layer order.
    pub fn unflatten_parameters(&mut self, flat: &[f32]) {
        let mut offset = 0;
        for layer in self.layers.iter_mut() {
            layer.weights.copy_from_slice(&flat[offset..offset + layer.weights.len()]);
            offset += layer.weights.len();
            layer.biases.copy_from_slice(&flat[offset..offset + layer.biases.len()]);
            offset += layer.biases.len();
        }
    }

    /// Cross-entropy loss of the last `forward` call's output against
    /// `label`. Only meaningful when `softmax_output` is set.
    pub fn loss(&self, label: usize) -> f32 {
        linalg::cross_entropy_loss(self.y.last().expect("network has at least one layer"), label)
    }

    /// Run `input` through every layer in order, applying softmax to the
    /// final activation if `softmax_output`, and copy the result to
    /// `output`.
    pub fn forward(&mut self, input: &[f32], output: &mut [f32]) {
        self.input_cache.copy_from_slice(input);
        let mut current: &[f32] = input;
        for i in 0..self.layers.len() {
            self.layers[i].forward(current, &mut self.z[i], &mut self.y[i]);
            current = &self.y[i];
        }
        if self.softmax_output {
            if let Some(last) = self.y.last_mut() {
                linalg::softmax_inplace(last);
            }
        }
        output.copy_from_slice(self.y.last().expect("network has at least one layer"));
    }

    /// Backprop `target` through every layer via `DenseLayer::backward`,
    /// accumulating into `self.grads` without touching any weights. Shared
    /// by `backward` (which applies the result) and `gradients_flat`
    /// (which only reads it, for Fisher-information estimation).
    fn compute_gradients(&mut self, target: &Target) {
        let n = self.layers.len();
        let mut grad_output = vec![0.0f32; self.output_size()];
        match target {
            Target::Label(label) => {
                assert!(self.softmax_output, "label targets require a softmax output layer");
                linalg::softmax_cross_entropy_grad(self.y.last().unwrap(), *label, &mut grad_output);
            }
            Target::Vector(t) => {
                for (g, (y, t)) in grad_output.iter_mut().zip(self.y.last().unwrap().iter().zip(t.iter())) {
                    *g = y - t;
                }
            }
        }

        let mut next_grad = grad_output;
        for i in (0..n).rev() {
            let layer_input: &[f32] = if i == 0 { &self.input_cache } else { &self.y[i - 1] };
            self.layers[i].backward(layer_input, &self.z[i], &self.y[i], &next_grad, &mut self.grad[i], &mut self.grads[i], &mut self.delta_scratch);
            next_grad = self.grad[i].clone();
        }
    }

    /// Backprop a classification target (one-hot label index) through a
    /// softmax output, or a plain target vector otherwise, then apply
    /// gradients at `self.learning_rate`.
    pub fn backward(&mut self, target: &Target) {
        self.compute_gradients(target);
        for i in 0..self.layers.len() {
            self.layers[i].apply_gradients(&self.grads[i], self.learning_rate);
            self.grads[i].zero();
        }
    }

    /// Backprop `target` against the output of the last `forward` call and
    /// flatten the resulting per-parameter gradient into `out` (length
    /// `parameter_count()`), in the same weights-then-biases layer order as
    /// `flatten_parameters`, without applying it to any weight. Used to
    /// accumulate squared-gradient samples for Elastic Weight
    /// Consolidation's Fisher information estimate, which must observe
    /// gradients at a fixed `theta` rather than a moving one.
    pub fn gradients_flat(&mut self, target: &Target, out: &mut [f32]) {
        self.compute_gradients(target);
        let mut offset = 0;
        for i in 0..self.layers.len() {
            let dw = &self.grads[i].d_weights;
            out[offset..offset + dw.len()].copy_from_slice(dw);
            offset += dw.len();
            let db = &self.grads[i].d_biases;
            out[offset..offset + db.len()].copy_from_slice(db);
            offset += db.len();
            self.grads[i].zero();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_net(rng: &mut Xorshift64) -> DenseLayer {
        DenseLayer::new(3, 2, Activation::Tanh, rng)
    }

    #[test]
    fn forward_applies_weights_bias_and_activation() {
        let layer = DenseLayer {
            in_size: 2,
            out_size: 2,
            activation: Activation::Linear,
            weights: vec![1.0, 0.0, 0.0, 1.0],
            biases: vec![0.5, -0.5],
        };
        let input = [2.0, 3.0];
        let mut z = [0.0; 2];
        let mut y = [0.0; 2];
        layer.forward(&input, &mut z, &mut y);
        assert!((y[0] - 2.5).abs() < 1e-6);
        assert!((y[1] - 2.5).abs() < 1e-6);
    }

    #[test]
    fn backward_matches_finite_difference_gradient() {
        let mut rng = Xorshift64::new(1234);
        let layer = tiny_net(&mut rng);
        let input = [0.3, -0.4, 0.8];
        let mut z = vec![0.0; layer.out_size];
        let mut y = vec![0.0; layer.out_size];
        layer.forward(&input, &mut z, &mut y);

        // Loss = 0.5 * sum(y^2); dL/dy = y.
        let grad_output = y.clone();
        let mut grad_input = vec![0.0; layer.in_size];
        let mut grads = DenseGrads::for_layer(&layer);
        let mut delta_scratch = vec![0.0; layer.out_size];
        layer.backward(&input, &z, &y, &grad_output, &mut grad_input, &mut grads, &mut delta_scratch);

        let loss = |w: &[f32]| -> f32 {
            let probe = DenseLayer { in_size: layer.in_size, out_size: layer.out_size, activation: layer.activation, weights: w.to_vec(), biases: layer.biases.clone() };
            let mut zz = vec![0.0; probe.out_size];
            let mut yy = vec![0.0; probe.out_size];
            probe.forward(&input, &mut zz, &mut yy);
            0.5 * yy.iter().map(|v| v * v).sum::<f32>()
        };

        let eps = 1e-3;
        let mut numeric = vec![0.0; layer.weights.len()];
        for i in 0..layer.weights.len() {
            let mut plus = layer.weights.clone();
            let mut minus = layer.weights.clone();
            plus[i] += eps;
            minus[i] -= eps;
            numeric[i] = (loss(&plus) - loss(&minus)) / (2.0 * eps);
        }

        for i in 0..numeric.len() {
            assert!(
                (numeric[i] - grads.d_weights[i]).abs() < 1e-2,
                "grad mismatch at {}: analytic {} vs numeric {}",
                i,
                grads.d_weights[i],
                numeric[i]
            );
        }
    }

    #[test]
    fn apply_gradients_moves_weights_against_gradient() {
        let mut layer = DenseLayer { in_size: 1, out_size: 1, activation: Activation::Linear, weights: vec![1.0], biases: vec![0.0] };
        let grads = DenseGrads { d_weights: vec![2.0], d_biases: vec![1.0] };
        layer.apply_gradients(&grads, 0.1);
        assert!((layer.weights[0] - 0.8).abs() < 1e-6);
        assert!((layer.biases[0] - (-0.1)).abs() < 1e-6);
    }

    fn deterministic_weights(network: &mut Network) {
        for layer in network.layers.iter_mut() {
            for (i, w) in layer.weights.iter_mut().enumerate() {
                *w = 0.01 * ((i % 100) as f32 - 50.0);
            }
            for b in layer.biases.iter_mut() {
                *b = 0.0;
            }
        }
    }

    #[test]
    fn classifier_output_is_a_probability_distribution_and_deterministic() {
        let mut rng = Xorshift64::new(7);
        let mut net = Network::new_generic(784, &[128], 10, Activation::Relu, Activation::Linear, true, 0.01, &mut rng);
        deterministic_weights(&mut net);

        let input: Vec<f32> = (0..784).map(|i| ((i % 256) as f32) / 255.0).collect();
        let mut out_a = vec![0.0; 10];
        net.forward(&input, &mut out_a);

        let sum: f32 = out_a.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5, "softmax output must sum to 1, got {sum}");
        assert!(out_a.iter().all(|&v| v >= 0.0));

        let argmax_a = out_a.iter().enumerate().max_by(|a, b| a.1.partial_cmp(b.1).unwrap()).unwrap().0;

        let mut out_b = vec![0.0; 10];
        net.forward(&input, &mut out_b);
        let argmax_b = out_b.iter().enumerate().max_by(|a, b| a.1.partial_cmp(b.1).unwrap()).unwrap().0;

        assert_eq!(argmax_a, argmax_b);
        assert_eq!(out_a, out_b);
    }

    #[test]
    fn training_step_reduces_loss_on_the_same_example() {
        let mut rng = Xorshift64::new(42);
        let mut net = Network::new_generic(4, &[6], 3, Activation::Relu, Activation::Linear, true, 0.1, &mut rng);

        let input = [0.2, -0.5, 0.9, 0.1];
        let label = 1usize;

        let mut out = vec![0.0; 3];
        net.forward(&input, &mut out);
        let loss_before = net.loss(label);

        for _ in 0..20 {
            net.forward(&input, &mut out);
            net.backward(&Target::Label(label));
        }

        net.forward(&input, &mut out);
        let loss_after = net.loss(label);
        assert!(loss_after < loss_before, "loss should decrease: before {loss_before}, after {loss_after}");
    }

    #[test]
    fn from_config_uses_the_configured_learning_rate() {
        let mut rng = Xorshift64::new(5);
        let config = NetworkConfig { learning_rate: 0.25 };
        let mut net = Network::from_config(2, 3, 3, 1, false, &config, &mut rng);
        assert_eq!(net.learning_rate, 0.25);
        net.forward(&[0.1, 0.2], &mut [0.0]);
    }

    #[test]
    fn flatten_then_unflatten_parameters_is_a_roundtrip() {
        let mut rng = Xorshift64::new(11);
        let mut net = Network::init_network(4, 5, 3, 2, false, 0.01, &mut rng);
        let flat = net.flatten_parameters();
        assert_eq!(flat.len(), net.parameter_count());

        // Perturb every weight, then restore from the flattened snapshot.
        for layer in net.layers.iter_mut() {
            for w in layer.weights.iter_mut() {
                *w += 1.0;
            }
        }
        net.unflatten_parameters(&flat);
        assert_eq!(net.flatten_parameters(), flat);
    }

    #[test]
    fn gradients_flat_does_not_perturb_weights() {
        let mut rng = Xorshift64::new(21);
        let mut net = Network::new_generic(3, &[4], 2, Activation::Relu, Activation::Linear, false, 0.1, &mut rng);
        let before = net.flatten_parameters();

        let mut out = vec![0.0; 2];
        net.forward(&[0.2, -0.1, 0.4], &mut out);
        let mut grad = vec![0.0; net.parameter_count()];
        net.gradients_flat(&Target::Vector(&[1.0, 0.0]), &mut grad);

        assert_eq!(net.flatten_parameters(), before, "gradients_flat must not mutate weights");
        assert!(grad.iter().any(|&g| g != 0.0), "gradient should be nonzero for a network pushed away from its target");
    }

    #[test]
    fn two_hidden_layer_entry_point_matches_generic_constructor_shape() {
        let mut rng = Xorshift64::new(3);
        let net = Network::init_network(10, 8, 6, 2, false, 0.01, &mut rng);
        assert_eq!(net.layers.len(), 3);
        assert_eq!(net.layers[0].in_size, 10);
        assert_eq!(net.layers[0].out_size, 8);
        assert_eq!(net.layers[1].in_size, 8);
        assert_eq!(net.layers[1].out_size, 6);
        assert_eq!(net.layers[2].in_size, 6);
        assert_eq!(net.layers[2].out_size, 2);
    }
}
