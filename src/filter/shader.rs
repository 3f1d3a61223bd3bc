//! Composite filter rendering a shader over upstream outputs.

use tracing::debug;

use super::{Filter, FilterRef, FilterState};
use crate::error::{RenderError, Result};
use crate::renderer::{Renderer, RendererRef, SamplingMode, ShaderHandle, TextureHandle};

/// A filter that renders a compiled shader over one or more upstream filters.
///
/// Upstream order is significant: the Nth declared upstream binds to the Nth
/// shader input slot. The filter owns its shader handle and its output
/// texture; both are released on [`dispose`](Filter::dispose), with `Drop`
/// as the backstop.
pub struct ShaderFilter {
    renderer: RendererRef,
    shader: Option<ShaderHandle>,
    sampling: SamplingMode,
    inputs: Vec<FilterRef>,
    output: Option<TextureHandle>,
    state: FilterState,
    disposed: bool,
}

impl ShaderFilter {
    /// Creates a filter over an ordered list of upstream filters.
    ///
    /// Fails immediately if `inputs` is empty; wiring errors belong at
    /// construction time, not in the per-frame hot path.
    pub fn new(
        renderer: RendererRef,
        shader: ShaderHandle,
        sampling: SamplingMode,
        inputs: Vec<FilterRef>,
    ) -> Result<Self> {
        if inputs.is_empty() {
            return Err(RenderError::NoUpstream);
        }
        Ok(Self {
            renderer,
            shader: Some(shader),
            sampling,
            inputs,
            output: None,
            state: FilterState::Stale,
            disposed: false,
        })
    }

    /// Single-input convenience form.
    pub fn with_input(
        renderer: RendererRef,
        shader: ShaderHandle,
        sampling: SamplingMode,
        input: FilterRef,
    ) -> Result<Self> {
        Self::new(renderer, shader, sampling, vec![input])
    }

    #[cfg(test)]
    pub(crate) fn push_upstream(&mut self, filter: FilterRef) {
        self.inputs.push(filter);
    }

    /// Reuses the owned output texture if it matches `size`, otherwise
    /// reallocates it through the renderer.
    fn ensure_output(&mut self, size: (u32, u32)) -> TextureHandle {
        if let Some(output) = &self.output {
            if output.size() == size {
                return output.clone();
            }
        }

        let mut renderer = self.renderer.borrow_mut();
        if let Some(old) = self.output.take() {
            debug!(
                "reallocating filter output {}x{} -> {}x{}",
                old.width(),
                old.height(),
                size.0,
                size.1
            );
            renderer.release_texture(&old);
        }
        let output = renderer.create_texture(size.0, size.1);
        self.output = Some(output.clone());
        output
    }

    fn render_inner(&mut self) -> Result<()> {
        // Refresh upstreams depth-first in declared order. Filters are
        // reused across frames and must be told explicitly that a new frame
        // has begun. A refused borrow means evaluation looped back into a
        // node that is already on the stack.
        for input in &self.inputs {
            let mut upstream = input
                .try_borrow_mut()
                .map_err(|_| RenderError::CyclicGraph)?;
            upstream.new_frame();
            upstream.render()?;
        }

        let mut input_textures = Vec::with_capacity(self.inputs.len());
        for input in &self.inputs {
            let texture = input
                .borrow()
                .output_texture()
                .ok_or(RenderError::UpstreamNotRendered)?;
            input_textures.push(texture);
        }

        let shader = self
            .shader
            .clone()
            .ok_or(RenderError::FilterDisposed)?;

        // The first upstream defines this node's geometry.
        let output = self.ensure_output(input_textures[0].size());

        self.renderer
            .borrow_mut()
            .execute_shader(&shader, &input_textures, &output, self.sampling)
    }
}

impl Filter for ShaderFilter {
    fn new_frame(&mut self) {
        if self.state == FilterState::Stale {
            // Everything upstream of a stale node is already invalidated.
            return;
        }
        for input in &self.inputs {
            if let Ok(mut upstream) = input.try_borrow_mut() {
                upstream.new_frame();
            }
        }
        self.state = FilterState::Stale;
    }

    fn render(&mut self) -> Result<()> {
        match self.state {
            FilterState::Fresh => return Ok(()),
            FilterState::Rendering => return Err(RenderError::CyclicGraph),
            FilterState::Stale => {}
        }

        self.state = FilterState::Rendering;
        match self.render_inner() {
            Ok(()) => {
                self.state = FilterState::Fresh;
                Ok(())
            }
            Err(e) => {
                self.state = FilterState::Stale;
                Err(e)
            }
        }
    }

    fn output_texture(&self) -> Option<TextureHandle> {
        if self.state == FilterState::Fresh {
            self.output.clone()
        } else {
            None
        }
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.state = FilterState::Stale;

        let mut renderer = self.renderer.borrow_mut();
        if let Some(shader) = self.shader.take() {
            renderer.release_shader(&shader);
        }
        if let Some(output) = self.output.take() {
            renderer.release_texture(&output);
        }
    }
}

impl Drop for ShaderFilter {
    fn drop(&mut self) {
        if !self.disposed {
            debug!("shader filter dropped without explicit dispose");
            self.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::filter::InputFilter;
    use crate::test_support::MockRenderer;

    fn input_ref(renderer: &RendererRef) -> FilterRef {
        Rc::new(RefCell::new(InputFilter::new(renderer.clone())))
    }

    fn shader_ref(
        renderer: &RendererRef,
        shader: ShaderHandle,
        inputs: Vec<FilterRef>,
    ) -> FilterRef {
        Rc::new(RefCell::new(
            ShaderFilter::new(renderer.clone(), shader, SamplingMode::Point, inputs).unwrap(),
        ))
    }

    fn new_shader(renderer: &RendererRef) -> ShaderHandle {
        renderer
            .borrow_mut()
            .compile_shader(std::path::Path::new("test.wgsl"))
            .unwrap()
    }

    #[test]
    fn empty_upstream_list_fails_at_construction() {
        let (_mock, renderer) = MockRenderer::shared((64, 48), (64, 48));
        let shader = new_shader(&renderer);

        let result = ShaderFilter::new(renderer, shader, SamplingMode::Point, vec![]);
        assert!(matches!(result, Err(RenderError::NoUpstream)));
    }

    #[test]
    fn first_render_without_new_frame_succeeds() {
        let (mock, renderer) = MockRenderer::shared((64, 48), (64, 48));
        let shader = new_shader(&renderer);
        let filter = shader_ref(&renderer, shader.clone(), vec![input_ref(&renderer)]);

        filter.borrow_mut().render().unwrap();

        let output = filter.borrow().output_texture().unwrap();
        assert_eq!(output.size(), (64, 48));

        let mock = mock.borrow();
        assert_eq!(mock.executions.len(), 1);
        assert_eq!(mock.executions[0].shader, shader.id());
        assert_eq!(mock.executions[0].inputs, vec![mock.frame_texture().id()]);
    }

    #[test]
    fn repeated_render_reuses_cached_output() {
        let (mock, renderer) = MockRenderer::shared((64, 48), (64, 48));
        let shader = new_shader(&renderer);
        let filter = shader_ref(&renderer, shader, vec![input_ref(&renderer)]);

        filter.borrow_mut().render().unwrap();
        let first = filter.borrow().output_texture().unwrap();
        filter.borrow_mut().render().unwrap();
        let second = filter.borrow().output_texture().unwrap();

        assert_eq!(first, second);
        assert_eq!(mock.borrow().executions.len(), 1);
    }

    #[test]
    fn input_slot_binding_is_positional() {
        let (mock, renderer) = MockRenderer::shared((64, 48), (64, 48));
        let input = input_ref(&renderer);

        let a = shader_ref(&renderer, new_shader(&renderer), vec![input.clone()]);
        let b = shader_ref(&renderer, new_shader(&renderer), vec![input.clone()]);

        let ab = shader_ref(&renderer, new_shader(&renderer), vec![a.clone(), b.clone()]);
        ab.borrow_mut().render().unwrap();
        let a_out = a.borrow().output_texture().unwrap();
        let b_out = b.borrow().output_texture().unwrap();
        {
            let mock = mock.borrow();
            let last = mock.executions.last().unwrap();
            assert_eq!(last.inputs, vec![a_out.id(), b_out.id()]);
        }

        // Permuted declaration order must permute the slot assignment.
        let ba = shader_ref(&renderer, new_shader(&renderer), vec![b.clone(), a.clone()]);
        ba.borrow_mut().new_frame();
        ba.borrow_mut().render().unwrap();
        let a_out = a.borrow().output_texture().unwrap();
        let b_out = b.borrow().output_texture().unwrap();
        let mock = mock.borrow();
        let last = mock.executions.last().unwrap();
        assert_eq!(last.inputs, vec![b_out.id(), a_out.id()]);
    }

    #[test]
    fn invalidation_propagates_through_the_chain() {
        let (mock, renderer) = MockRenderer::shared((64, 48), (64, 48));
        let a = shader_ref(&renderer, new_shader(&renderer), vec![input_ref(&renderer)]);
        let b = shader_ref(&renderer, new_shader(&renderer), vec![a.clone()]);

        b.borrow_mut().render().unwrap();
        assert_eq!(mock.borrow().executions.len(), 2);

        // A second frame cycle re-renders every stage.
        b.borrow_mut().new_frame();
        assert!(a.borrow().output_texture().is_none());
        b.borrow_mut().render().unwrap();
        assert_eq!(mock.borrow().executions.len(), 4);
    }

    #[test]
    fn cycle_is_detected_instead_of_recursing() {
        let (_mock, renderer) = MockRenderer::shared((64, 48), (64, 48));
        let a = Rc::new(RefCell::new(
            ShaderFilter::with_input(
                renderer.clone(),
                new_shader(&renderer),
                SamplingMode::Point,
                input_ref(&renderer),
            )
            .unwrap(),
        ));

        // Wire the node into its own upstream list.
        let a_dyn: FilterRef = a.clone();
        a.borrow_mut().push_upstream(a_dyn);

        let result = a.borrow_mut().render();
        assert!(matches!(result, Err(RenderError::CyclicGraph)));
    }

    #[test]
    fn dispose_releases_each_resource_exactly_once() {
        let (mock, renderer) = MockRenderer::shared((64, 48), (64, 48));
        let shader = new_shader(&renderer);
        let mut filter = ShaderFilter::with_input(
            renderer.clone(),
            shader.clone(),
            SamplingMode::Linear,
            input_ref(&renderer),
        )
        .unwrap();

        filter.render().unwrap();
        let output = filter.output_texture().unwrap();

        filter.dispose();
        filter.dispose();
        drop(filter); // backstop must not double-release

        let mock = mock.borrow();
        assert_eq!(
            mock.released_shaders.iter().filter(|&&id| id == shader.id()).count(),
            1
        );
        assert_eq!(
            mock.released_textures.iter().filter(|&&id| id == output.id()).count(),
            1
        );
    }

    #[test]
    fn render_after_dispose_fails() {
        let (_mock, renderer) = MockRenderer::shared((64, 48), (64, 48));
        let mut filter = ShaderFilter::with_input(
            renderer.clone(),
            new_shader(&renderer),
            SamplingMode::Point,
            input_ref(&renderer),
        )
        .unwrap();

        filter.dispose();
        assert!(matches!(filter.render(), Err(RenderError::FilterDisposed)));
    }

    #[test]
    fn output_reallocates_when_input_size_changes() {
        let (mock, renderer) = MockRenderer::shared((64, 48), (64, 48));
        let filter = shader_ref(&renderer, new_shader(&renderer), vec![input_ref(&renderer)]);

        filter.borrow_mut().render().unwrap();
        let old = filter.borrow().output_texture().unwrap();
        assert_eq!(old.size(), (64, 48));

        mock.borrow_mut().set_input_size(128, 96);
        filter.borrow_mut().new_frame();
        filter.borrow_mut().render().unwrap();
        let new = filter.borrow().output_texture().unwrap();

        assert_eq!(new.size(), (128, 96));
        assert!(mock.borrow().released_textures.contains(&old.id()));
    }
}
