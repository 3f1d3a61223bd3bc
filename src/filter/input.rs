//! Leaf filter exposing the renderer's current decoded frame.

use super::{Filter, FilterState};
use crate::error::Result;
use crate::renderer::{Renderer, RendererRef, TextureHandle};

/// Zero-upstream leaf filter wrapping the renderer's current frame texture.
///
/// Created lazily by the render script and reused across frames; it carries
/// no per-frame state beyond what the renderer itself manages.
pub struct InputFilter {
    renderer: RendererRef,
    output: Option<TextureHandle>,
    state: FilterState,
}

impl InputFilter {
    pub fn new(renderer: RendererRef) -> Self {
        Self {
            renderer,
            output: None,
            state: FilterState::Stale,
        }
    }
}

impl Filter for InputFilter {
    fn new_frame(&mut self) {
        self.state = FilterState::Stale;
    }

    fn render(&mut self) -> Result<()> {
        if self.state == FilterState::Fresh {
            return Ok(());
        }
        // Pass-through: snapshot whatever frame the renderer currently holds.
        self.output = Some(self.renderer.borrow().frame_texture());
        self.state = FilterState::Fresh;
        Ok(())
    }

    fn output_texture(&self) -> Option<TextureHandle> {
        if self.state == FilterState::Fresh {
            self.output.clone()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockRenderer;

    #[test]
    fn render_exposes_current_frame_texture() {
        let (mock, renderer) = MockRenderer::shared((64, 48), (64, 48));
        let mut filter = InputFilter::new(renderer);

        assert!(filter.output_texture().is_none());
        filter.render().unwrap();

        let output = filter.output_texture().unwrap();
        assert_eq!(output, mock.borrow().frame_texture());
    }

    #[test]
    fn output_is_unreadable_after_invalidation() {
        let (_mock, renderer) = MockRenderer::shared((64, 48), (64, 48));
        let mut filter = InputFilter::new(renderer);

        filter.render().unwrap();
        assert!(filter.output_texture().is_some());

        filter.new_frame();
        assert!(filter.output_texture().is_none());
    }

    #[test]
    fn tracks_frame_texture_across_size_changes() {
        let (mock, renderer) = MockRenderer::shared((64, 48), (64, 48));
        let mut filter = InputFilter::new(renderer);

        filter.render().unwrap();
        let before = filter.output_texture().unwrap();

        mock.borrow_mut().set_input_size(128, 96);
        filter.new_frame();
        filter.render().unwrap();
        let after = filter.output_texture().unwrap();

        assert_ne!(before, after);
        assert_eq!(after.size(), (128, 96));
    }
}
