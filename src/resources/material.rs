/// One draw pass of a material.
///
/// Every pass of a mesh's effective material gets its own mesh record, so the
/// pass count decides how many records a mesh occupies.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialPass {
    pub name: String,
    pub depth_write: bool,
    pub transparent: bool,
}

impl Default for MaterialPass {
    fn default() -> Self {
        Self {
            name: "Main".to_string(),
            depth_write: true,
            transparent: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub passes: Vec<MaterialPass>,
}

impl Material {
    /// Single opaque pass.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            passes: vec![MaterialPass::default()],
        }
    }

    /// `count` identical opaque passes (at least one).
    #[must_use]
    pub fn with_pass_count(name: &str, count: usize) -> Self {
        let passes = (0..count.max(1))
            .map(|i| MaterialPass {
                name: format!("Pass{i}"),
                ..MaterialPass::default()
            })
            .collect();
        Self {
            name: name.to_string(),
            passes,
        }
    }

    /// Number of mesh records a mesh using this material needs. Never zero.
    #[inline]
    #[must_use]
    pub fn pass_count(&self) -> usize {
        self.passes.len().max(1)
    }

    /// Depth-write flag of pass `index`; a material without passes writes depth.
    #[must_use]
    pub fn depth_write(&self, index: usize) -> bool {
        self.passes.get(index).is_none_or(|p| p.depth_write)
    }
}
