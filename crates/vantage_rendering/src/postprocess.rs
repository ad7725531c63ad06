//! # Post-Process Chain
//!
//! Ordered full-screen shader stages run after the main pass. Stages
//! ping-pong between two offscreen buffers; every stage also sees the
//! original scene render.
//!
//! ```text
//! scene -> Original
//! stage 0: Original    -> PingPong(0)
//! stage 1: PingPong(0) -> PingPong(1)
//! stage 2: PingPong(1) -> destination
//! ```
//!
//! The same chain machinery backs render-to-texture: a texture source node's
//! children are run as a chain into the texture's buffer.

use std::collections::HashMap;

use vantage_core::SceneGraph;
use vantage_shared::NodeId;

use crate::device::{BufferSlot, RenderDevice, RenderError, RenderTarget, ShaderPass, ShaderRef};

/// Tag of the node holding the post-process stages.
pub const POSTPROCESS_TAG: &str = "postprocess";

/// Ordered list of post-process shaders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostProcessChain {
    stages: Vec<ShaderRef>,
    enabled: bool,
}

impl PostProcessChain {
    /// Creates an enabled chain from explicit stages.
    #[must_use]
    pub fn from_stages(stages: Vec<ShaderRef>) -> Self {
        Self { stages, enabled: true }
    }

    /// Collects the stages under `root`'s `<postprocess>` child.
    ///
    /// Returns `None` if there is no such child or it has no usable stage.
    #[must_use]
    pub fn from_scene(scene: &SceneGraph, root: NodeId) -> Option<Self> {
        let host = scene.first_child_with_tag(root, POSTPROCESS_TAG)?;
        let stages = shader_children(scene, host);
        if stages.is_empty() {
            return None;
        }
        let mut chain = Self::from_stages(stages);
        chain.sync_visibility(scene, host);
        Some(chain)
    }

    /// Reads `visible` from the host node. Anything but `"false"` enables.
    pub fn sync_visibility(&mut self, scene: &SceneGraph, host: NodeId) {
        let visible = scene
            .node(host)
            .and_then(|n| n.attribute("visible"))
            .map_or(true, |v| !v.trim().eq_ignore_ascii_case("false"));
        self.enabled = visible;
    }

    /// Enables or disables the chain.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Returns true if the chain will run on the next draw.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.enabled && !self.stages.is_empty()
    }

    /// Stages in order.
    #[must_use]
    pub fn stages(&self) -> &[ShaderRef] {
        &self.stages
    }

    /// Plans the passes that write the final stage to `destination`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn plan(&self, destination: &RenderTarget) -> Vec<ShaderPass> {
        let last = self.stages.len().saturating_sub(1);
        let mut input = BufferSlot::Original;
        self.stages
            .iter()
            .enumerate()
            .map(|(stage, shader)| {
                let output = if stage == last {
                    destination.clone()
                } else {
                    RenderTarget::Buffer(BufferSlot::PingPong((stage % 2) as u8))
                };
                let pass = ShaderPass {
                    stage,
                    shader: shader.clone(),
                    input: input.clone(),
                    original: BufferSlot::Original,
                    output: output.clone(),
                };
                if let RenderTarget::Buffer(slot) = output {
                    input = slot;
                }
                pass
            })
            .collect()
    }

    /// Runs every stage. Returns the number of passes run.
    ///
    /// # Errors
    ///
    /// Stops at the first failing stage and reports it as
    /// [`RenderError::ShaderPass`].
    pub fn run<D: RenderDevice + ?Sized>(
        &self,
        device: &mut D,
        destination: &RenderTarget,
    ) -> Result<usize, RenderError> {
        let passes = self.plan(destination);
        for pass in &passes {
            device.render_shader_pass(pass).map_err(|err| match err {
                RenderError::ShaderPass { .. } => err,
                other => RenderError::ShaderPass {
                    stage: pass.stage,
                    reason: other.to_string(),
                },
            })?;
        }
        Ok(passes.len())
    }
}

fn shader_children(scene: &SceneGraph, host: NodeId) -> Vec<ShaderRef> {
    let Some(node) = scene.node(host) else {
        return Vec::new();
    };
    node.children()
        .iter()
        .filter_map(|&child| scene.node(child))
        .filter_map(|child| {
            child
                .attribute("shader")
                .map(ShaderRef::new)
                .or_else(|| child.dom_id().map(|id| ShaderRef::new(format!("#{id}"))))
        })
        .collect()
}

/// A resolved render-to-texture source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureSource {
    /// Texture width.
    pub width: u32,
    /// Texture height.
    pub height: u32,
    /// Shaders rendered into the texture, in order.
    pub shaders: Vec<ShaderRef>,
}

/// Looks up texture sources by `#id` reference.
pub trait TextureSourceResolver {
    /// Resolves `reference`. `default_size` fills missing dimensions.
    fn resolve_texture_source(&self, reference: &str, default_size: u32) -> Option<TextureSource>;
}

impl TextureSourceResolver for SceneGraph {
    fn resolve_texture_source(&self, reference: &str, default_size: u32) -> Option<TextureSource> {
        let id = reference.trim().strip_prefix('#').unwrap_or(reference);
        let node_id = self.element_by_id(id)?;
        let node = self.node(node_id)?;
        let dimension = |name: &str| {
            node.attribute(name)
                .and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|&v| v > 0)
                .unwrap_or(default_size)
        };
        Some(TextureSource {
            width: dimension("width"),
            height: dimension("height"),
            shaders: shader_children(self, node_id),
        })
    }
}

/// A render texture handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureHandle {
    /// Cache key (the source reference).
    pub key: String,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

#[derive(Debug)]
struct TextureEntry {
    chain: PostProcessChain,
    width: u32,
    height: u32,
    dirty: bool,
}

/// Render-to-texture targets, keyed by source reference.
#[derive(Debug)]
pub struct RenderTextureCache {
    entries: HashMap<String, TextureEntry>,
    default_size: u32,
}

impl RenderTextureCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(default_size: u32) -> Self {
        Self {
            entries: HashMap::new(),
            default_size,
        }
    }

    /// Returns the texture for `src`, re-rendering it if dirty.
    ///
    /// Unresolvable sources and device failures are logged and yield `None`.
    pub fn rendered_texture<D, R>(&mut self, device: &mut D, resolver: &R, src: &str) -> Option<TextureHandle>
    where
        D: RenderDevice + ?Sized,
        R: TextureSourceResolver + ?Sized,
    {
        if !self.entries.contains_key(src) {
            let Some(source) = resolver.resolve_texture_source(src, self.default_size) else {
                tracing::error!(source = src, "could not resolve texture source");
                return None;
            };
            if let Err(err) = device.create_render_texture(src, source.width, source.height) {
                tracing::error!(source = src, error = %err, "render texture allocation failed");
                return None;
            }
            self.entries.insert(
                src.to_owned(),
                TextureEntry {
                    chain: PostProcessChain::from_stages(source.shaders),
                    width: source.width,
                    height: source.height,
                    dirty: true,
                },
            );
        }

        let entry = self.entries.get_mut(src)?;
        if entry.dirty {
            let target = RenderTarget::Buffer(BufferSlot::Texture(src.to_owned()));
            if let Err(err) = entry.chain.run(device, &target) {
                tracing::error!(source = src, error = %err, "render texture pass failed");
            }
            entry.dirty = false;
        }
        Some(TextureHandle {
            key: src.to_owned(),
            width: entry.width,
            height: entry.height,
        })
    }

    /// Marks every entry dirty. Called at the start of each draw.
    pub fn invalidate_all(&mut self) {
        for entry in self.entries.values_mut() {
            entry.dirty = true;
        }
    }

    /// Number of cached textures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
