use tract_onnx::prelude::*;

use crate::error::ModelLoadError;

type NnModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Memory layout of a 4D image tensor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Layout {
    /// `[batch, channels, height, width]`
    Nchw,
    /// `[batch, height, width, channels]`
    Nhwc,
}

/// Shape of the model input: batch of one square RGB image.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InputShape {
    pub side: u32,
    pub layout: Layout,
}

impl InputShape {
    pub const CHANNELS: usize = 3;

    pub fn new(side: u32, layout: Layout) -> Self {
        Self { side, layout }
    }

    pub fn dims(&self) -> [usize; 4] {
        let side = self.side as usize;
        match self.layout {
            Layout::Nchw => [1, Self::CHANNELS, side, side],
            Layout::Nhwc => [1, side, side, Self::CHANNELS],
        }
    }
}

/// A network turning one preprocessed image tensor into class scores.
pub trait InferModel: Send + Sync {
    /// Input shape the preprocessed tensor must have.
    fn input_shape(&self) -> InputShape;

    /// Whether the network was optimized into a runnable plan.
    fn is_compiled(&self) -> bool {
        true
    }

    /// Run a forward pass. The input is consumed, the raw output handed back.
    fn forward(&self, input: Tensor) -> anyhow::Result<Tensor>;
}

/// Image classifier backed by an ONNX graph.
pub struct OnnxClassifier {
    model: NnModel,
    input_shape: InputShape,
}

impl OnnxClassifier {
    /// Parse an ONNX model and compile it for the given input shape.
    pub fn from_bytes(bytes: &[u8], input_shape: InputShape) -> Result<Self, ModelLoadError> {
        let model = compile(bytes, input_shape)
            .map_err(|err| ModelLoadError::Format(format!("{err:#}")))?;
        Ok(Self { model, input_shape })
    }
}

impl InferModel for OnnxClassifier {
    fn input_shape(&self) -> InputShape {
        self.input_shape
    }

    fn forward(&self, input: Tensor) -> anyhow::Result<Tensor> {
        let outputs = self.model.run(tvec!(input.into()))?;
        let scores = outputs
            .first()
            .ok_or_else(|| anyhow::anyhow!("model has no outputs"))?;

        Ok((**scores).clone())
    }
}

fn compile(bytes: &[u8], input_shape: InputShape) -> TractResult<NnModel> {
    let dims = input_shape.dims();
    let input_fact =
        InferenceFact::dt_shape(f32::datum_type(), tvec!(dims[0], dims[1], dims[2], dims[3]));
    let mut reader = std::io::Cursor::new(bytes);
    let model = tract_onnx::onnx()
        .model_for_read(&mut reader)?
        .with_input_fact(0, input_fact)?
        .into_optimized()?
        .into_runnable()?;

    Ok(model)
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_input_dims_follow_layout() {
        assert_eq!(InputShape::new(224, Layout::Nhwc).dims(), [1, 224, 224, 3]);
        assert_eq!(InputShape::new(32, Layout::Nchw).dims(), [1, 3, 32, 32]);
    }

    #[test]
    fn test_garbage_is_a_format_error() {
        let res = OnnxClassifier::from_bytes(
            b"definitely not protobuf",
            InputShape::new(8, Layout::Nhwc),
        );
        assert!(matches!(res, Err(ModelLoadError::Format(_))));
    }
}
