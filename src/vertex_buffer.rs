use std::mem::size_of;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Which optional attributes follow the position in each interleaved vertex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexFormat {
    pub normals: bool,
    pub texcoords: bool,
    pub colors: bool,
}

impl VertexFormat {
    pub const POSITION: Self = Self {
        normals: false,
        texcoords: false,
        colors: false,
    };

    pub const fn with_normals(mut self) -> Self {
        self.normals = true;
        self
    }

    pub const fn with_texcoords(mut self) -> Self {
        self.texcoords = true;
        self
    }

    pub const fn with_colors(mut self) -> Self {
        self.colors = true;
        self
    }

    /// Attributes in interleaving order: position, normal, texcoord, color.
    pub fn attributes(self) -> Vec<VertexAttribute> {
        let mut attributes = Vec::with_capacity(4);
        let mut offset = 0;
        let mut push = |kind: AttributeKind| {
            attributes.push(VertexAttribute { kind, offset });
            offset += kind.size();
        };
        push(AttributeKind::Position);
        if self.normals {
            push(AttributeKind::Normal);
        }
        if self.texcoords {
            push(AttributeKind::TexCoord);
        }
        if self.colors {
            push(AttributeKind::Color);
        }
        attributes
    }

    pub fn floats_per_vertex(self) -> usize {
        self.attributes()
            .iter()
            .map(|attribute| attribute.kind.components())
            .sum()
    }

    /// Size of one vertex in bytes.
    pub fn stride(self) -> usize {
        self.floats_per_vertex() * size_of::<f32>()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeKind {
    Position,
    Normal,
    TexCoord,
    Color,
}

impl AttributeKind {
    pub fn components(self) -> usize {
        match self {
            Self::Position | Self::Normal => 3,
            Self::TexCoord => 2,
            Self::Color => 4,
        }
    }

    pub fn size(self) -> usize {
        self.components() * size_of::<f32>()
    }
}

/// Byte offset of an attribute inside one interleaved vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub kind: AttributeKind,
    pub offset: usize,
}

/// CPU-side interleaved vertex storage, ready to be copied into a GPU buffer.
///
/// Uploading and binding belong to the render backend; this type owns the
/// bytes and the layout a backend needs to do so.
#[derive(Debug, Clone, Default)]
pub struct VertexBuffer {
    format: VertexFormat,
    data: Vec<u8>,
    vertex_count: usize,
}

impl VertexBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole buffer. `vertices` must hold exactly
    /// `vertex_count` vertices laid out as `format` describes.
    pub fn set_vertex_data(
        &mut self,
        format: VertexFormat,
        vertices: &[f32],
        vertex_count: usize,
    ) -> Result<()> {
        let expected = vertex_count * format.floats_per_vertex();
        if vertices.len() != expected {
            return Err(anyhow!(
                "expected {expected} floats for {vertex_count} vertices, got {}",
                vertices.len()
            ));
        }
        self.format = format;
        self.data = bytemuck::cast_slice(vertices).to_vec();
        self.vertex_count = vertex_count;
        Ok(())
    }

    /// Overwrites `vertex_count` vertices starting at `vertex_offset`. The
    /// range must lie inside the data set by the last full upload.
    pub fn set_vertex_sub_data(
        &mut self,
        vertices: &[f32],
        vertex_offset: usize,
        vertex_count: usize,
    ) -> Result<()> {
        let floats = vertex_count.checked_mul(self.format.floats_per_vertex());
        if floats != Some(vertices.len()) {
            return Err(anyhow!(
                "expected {vertex_count} vertices of {} floats, got {} floats",
                self.format.floats_per_vertex(),
                vertices.len()
            ));
        }
        let stride = self.format.stride();
        let range = vertex_offset.checked_mul(stride).and_then(|start| {
            let len = vertex_count.checked_mul(stride)?;
            Some((start, start.checked_add(len)?))
        });
        let (start, end) = match range {
            Some((start, end)) if end <= self.data.len() => (start, end),
            _ => {
                return Err(anyhow!(
                    "{vertex_count} vertices at offset {vertex_offset} exceed buffer of {} vertices",
                    self.vertex_count
                ))
            }
        };
        self.data[start..end].copy_from_slice(bytemuck::cast_slice(vertices));
        Ok(())
    }

    pub fn format(&self) -> VertexFormat {
        self.format
    }

    /// Size of the vertex data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Reads vertex `index` back as floats.
    pub fn vertex(&self, index: usize) -> Option<Vec<f32>> {
        if index >= self.vertex_count {
            return None;
        }
        let stride = self.format.stride();
        let bytes = &self.data[index * stride..(index + 1) * stride];
        Some(
            bytes
                .chunks_exact(size_of::<f32>())
                .map(bytemuck::pod_read_unaligned::<f32>)
                .collect(),
        )
    }
}
