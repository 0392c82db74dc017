//! Dense crop classifier
//!
//! Each hidden block is Linear -> ReLU -> BatchNorm -> Dropout; the head is a
//! Linear layer to C logits, with softmax applied by `forward_softmax`.
//! Dropout and batch statistics are only active on an autodiff backend;
//! `AutodiffModule::valid()` yields the inference-mode model.

use burn::{
    module::Module,
    nn::{BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, Relu},
    tensor::{activation::softmax, backend::Backend, Tensor},
};

use super::config::{ArchitectureDescriptor, HiddenLayerSpec, ParameterShape};

/// One hidden block
#[derive(Module, Debug)]
pub struct DenseBlock<B: Backend> {
    pub linear: Linear<B>,
    pub relu: Relu,
    pub norm: BatchNorm<B>,
    pub dropout: Dropout,
}

impl<B: Backend> DenseBlock<B> {
    pub fn new(fan_in: usize, spec: &HiddenLayerSpec, device: &B::Device) -> Self {
        let linear = LinearConfig::new(fan_in, spec.units).init(device);
        let norm = BatchNormConfig::new(spec.units)
            .with_momentum(spec.batch_norm.momentum)
            .with_epsilon(spec.batch_norm.epsilon)
            .init(device);

        Self {
            linear,
            relu: Relu::new(),
            norm,
            dropout: DropoutConfig::new(spec.dropout).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.linear.forward(x);
        let x = self.relu.forward(x);
        let x = self.norm.forward(x);
        self.dropout.forward(x)
    }
}

/// Feedforward classifier over the five crop features
#[derive(Module, Debug)]
pub struct CropClassifier<B: Backend> {
    pub blocks: Vec<DenseBlock<B>>,
    pub output: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> CropClassifier<B> {
    /// Build a freshly initialized model. The descriptor is assumed validated.
    pub fn new(descriptor: &ArchitectureDescriptor, device: &B::Device) -> Self {
        let mut fan_in = descriptor.input_features;
        let mut blocks = Vec::with_capacity(descriptor.hidden.len());

        for spec in &descriptor.hidden {
            blocks.push(DenseBlock::new(fan_in, spec, device));
            fan_in = spec.units;
        }

        let output = LinearConfig::new(fan_in, descriptor.num_classes).init(device);

        Self {
            blocks,
            output,
            num_classes: descriptor.num_classes,
        }
    }

    /// Logits with shape [batch_size, num_classes]
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = input;
        for block in &self.blocks {
            x = block.forward(x);
        }
        self.output.forward(x)
    }

    /// Class probabilities with shape [batch_size, num_classes]
    pub fn forward_softmax(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        softmax(self.forward(input), 1)
    }

    /// Sum of `coefficient * ||W||^2` over the hidden kernels
    ///
    /// Returns `None` when every coefficient is zero.
    pub fn l2_penalty(&self, coefficients: &[f64]) -> Option<Tensor<B, 1>> {
        let mut penalty: Option<Tensor<B, 1>> = None;

        for (block, &coefficient) in self.blocks.iter().zip(coefficients) {
            if coefficient == 0.0 {
                continue;
            }
            let weight = block.linear.weight.val();
            let term = (weight.clone() * weight).sum().mul_scalar(coefficient);
            penalty = Some(match penalty {
                Some(total) => total + term,
                None => term,
            });
        }

        penalty
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Actual tensor shapes, named and ordered like
    /// `ArchitectureDescriptor::parameter_shapes`
    pub fn parameter_shapes(&self) -> Vec<ParameterShape> {
        let mut shapes = Vec::new();

        for (i, block) in self.blocks.iter().enumerate() {
            shapes.push(ParameterShape::new(
                format!("blocks.{i}.linear.weight"),
                block.linear.weight.val().dims().to_vec(),
            ));
            shapes.push(ParameterShape::new(
                format!("blocks.{i}.linear.bias"),
                bias_shape(&block.linear),
            ));
            shapes.push(ParameterShape::new(
                format!("blocks.{i}.norm.gamma"),
                block.norm.gamma.val().dims().to_vec(),
            ));
            shapes.push(ParameterShape::new(
                format!("blocks.{i}.norm.beta"),
                block.norm.beta.val().dims().to_vec(),
            ));
            shapes.push(ParameterShape::new(
                format!("blocks.{i}.norm.running_mean"),
                block.norm.running_mean.value().dims().to_vec(),
            ));
            shapes.push(ParameterShape::new(
                format!("blocks.{i}.norm.running_var"),
                block.norm.running_var.value().dims().to_vec(),
            ));
        }

        shapes.push(ParameterShape::new(
            "output.weight",
            self.output.weight.val().dims().to_vec(),
        ));
        shapes.push(ParameterShape::new(
            "output.bias",
            bias_shape(&self.output),
        ));

        shapes
    }
}

fn bias_shape<B: Backend>(linear: &Linear<B>) -> Vec<usize> {
    match &linear.bias {
        Some(bias) => bias.val().dims().to_vec(),
        None => Vec::new(),
    }
}
