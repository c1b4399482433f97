//! Reduction of vertex attribute and binding descriptions.
//!
//! The result feeds the vertex-shader variant key: everything here can
//! change the fetch code the back-end generates (formats, strides, alpha
//! adjust, instance divisors), plus the per-binding alignment facts the
//! command recorder uses to decide between buffer and per-attribute
//! descriptors.

use ash::vk;

use crate::pipeline::create_info::{VertexAttribute, VertexBinding};

pub const MAX_ATTRS: usize = 32;
pub const MAX_BINDINGS: usize = 32;

/// Component widening applied to the alpha channel of packed 10-bit
/// signed formats on fetch.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum AlphaAdjust {
    #[default]
    None,
    Snorm,
    Sscaled,
    Sint,
}

/// Reduced vertex input state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexInputReduced {
    /// The caller opted into dynamic vertex input; every field below is
    /// defaulted and the state comes from the command buffer.
    pub dynamic: bool,
    /// Bit per used attribute location.
    pub attribute_mask: u32,
    /// Bit per location fetched at instance rate.
    pub instance_rate_inputs: u32,
    /// Bit per location whose binding has a divisor other than 1.
    pub nontrivial_divisors: u32,
    /// Bit per location that needs the B/R post-fetch swap.
    pub post_shuffle: u32,
    /// Alpha-adjust kind per location, two bits each, split over two words.
    pub alpha_adjust_lo: u32,
    pub alpha_adjust_hi: u32,
    pub formats: [vk::Format; MAX_ATTRS],
    pub bindings: [u8; MAX_ATTRS],
    pub offsets: [u32; MAX_ATTRS],
    pub strides: [u32; MAX_ATTRS],
    pub divisors: [u32; MAX_ATTRS],
    /// Largest channel alignment proven for each binding.
    pub binding_align: [u32; MAX_BINDINGS],
    /// Bit per location whose offset is not aligned to its channel size;
    /// these force per-attribute descriptors at record time.
    pub misaligned_mask: u32,
}

impl Default for VertexInputReduced {
    fn default() -> Self {
        Self {
            dynamic: false,
            attribute_mask: 0,
            instance_rate_inputs: 0,
            nontrivial_divisors: 0,
            post_shuffle: 0,
            alpha_adjust_lo: 0,
            alpha_adjust_hi: 0,
            formats: [vk::Format::UNDEFINED; MAX_ATTRS],
            bindings: [0; MAX_ATTRS],
            offsets: [0; MAX_ATTRS],
            strides: [0; MAX_ATTRS],
            divisors: [1; MAX_ATTRS],
            binding_align: [0; MAX_BINDINGS],
            misaligned_mask: 0,
        }
    }
}

fn alpha_adjust(format: vk::Format) -> AlphaAdjust {
    match format {
        vk::Format::A2R10G10B10_SNORM_PACK32 | vk::Format::A2B10G10R10_SNORM_PACK32 => {
            AlphaAdjust::Snorm
        }
        vk::Format::A2R10G10B10_SSCALED_PACK32 | vk::Format::A2B10G10R10_SSCALED_PACK32 => {
            AlphaAdjust::Sscaled
        }
        vk::Format::A2R10G10B10_SINT_PACK32 | vk::Format::A2B10G10R10_SINT_PACK32 => {
            AlphaAdjust::Sint
        }
        _ => AlphaAdjust::None,
    }
}

fn needs_post_shuffle(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::B8G8R8A8_UNORM
            | vk::Format::B8G8R8A8_SNORM
            | vk::Format::B8G8R8A8_UINT
            | vk::Format::B8G8R8A8_SINT
            | vk::Format::B8G8R8A8_USCALED
            | vk::Format::B8G8R8A8_SSCALED
            | vk::Format::B8G8R8A8_SRGB
    )
}

/// Byte size of one channel of the format; packed formats count as one
/// dword-wide channel.
fn channel_size(format: vk::Format) -> u32 {
    match format {
        vk::Format::R8_UNORM
        | vk::Format::R8_SNORM
        | vk::Format::R8_USCALED
        | vk::Format::R8_SSCALED
        | vk::Format::R8_UINT
        | vk::Format::R8_SINT
        | vk::Format::R8G8_UNORM
        | vk::Format::R8G8_SNORM
        | vk::Format::R8G8_USCALED
        | vk::Format::R8G8_SSCALED
        | vk::Format::R8G8_UINT
        | vk::Format::R8G8_SINT
        | vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SNORM
        | vk::Format::R8G8B8A8_USCALED
        | vk::Format::R8G8B8A8_SSCALED
        | vk::Format::R8G8B8A8_UINT
        | vk::Format::R8G8B8A8_SINT
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SNORM
        | vk::Format::B8G8R8A8_UINT
        | vk::Format::B8G8R8A8_SINT => 1,
        vk::Format::R16_UNORM
        | vk::Format::R16_SNORM
        | vk::Format::R16_USCALED
        | vk::Format::R16_SSCALED
        | vk::Format::R16_UINT
        | vk::Format::R16_SINT
        | vk::Format::R16_SFLOAT
        | vk::Format::R16G16_UNORM
        | vk::Format::R16G16_SNORM
        | vk::Format::R16G16_UINT
        | vk::Format::R16G16_SINT
        | vk::Format::R16G16_SFLOAT
        | vk::Format::R16G16B16A16_UNORM
        | vk::Format::R16G16B16A16_SNORM
        | vk::Format::R16G16B16A16_UINT
        | vk::Format::R16G16B16A16_SINT
        | vk::Format::R16G16B16A16_SFLOAT => 2,
        _ => 4,
    }
}

/// Reduce vertex input state. `dynamic` reflects a
/// `VK_DYNAMIC_STATE_VERTEX_INPUT_EXT` opt-in.
pub fn reduce(
    bindings: &[VertexBinding],
    attributes: &[VertexAttribute],
    dynamic: bool,
) -> VertexInputReduced {
    let mut out = VertexInputReduced::default();
    if dynamic {
        out.dynamic = true;
        return out;
    }

    for attr in attributes {
        let location = attr.location() as usize;
        if location >= MAX_ATTRS {
            continue;
        }
        let Some(binding) = bindings.iter().find(|b| b.binding == attr.binding()) else {
            continue;
        };

        out.attribute_mask |= 1 << location;
        out.formats[location] = attr.format();
        out.bindings[location] = binding.binding as u8;
        out.offsets[location] = attr.offset();
        out.strides[location] = binding.stride;

        if binding.input_rate == vk::VertexInputRate::INSTANCE {
            out.instance_rate_inputs |= 1 << location;
            out.divisors[location] = binding.divisor;
            if binding.divisor != 1 {
                out.nontrivial_divisors |= 1 << location;
            }
        }

        if needs_post_shuffle(attr.format()) {
            out.post_shuffle |= 1 << location;
        }

        let adjust = alpha_adjust(attr.format()) as u32;
        out.alpha_adjust_lo |= (adjust & 0x1) << location;
        out.alpha_adjust_hi |= ((adjust >> 1) & 0x1) << location;

        // An attribute only proves binding alignment when its own offset is
        // aligned to the channel size; otherwise the whole attribute must go
        // through a per-attribute descriptor at record time.
        let chan = channel_size(attr.format());
        let b = binding.binding as usize;
        if attr.offset() % chan == 0 && binding.stride % chan == 0 {
            if b < MAX_BINDINGS {
                out.binding_align[b] = out.binding_align[b].max(chan);
            }
        } else {
            out.misaligned_mask |= 1 << location;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(location: u32, binding: u32, format: vk::Format, offset: u32) -> VertexAttribute {
        VertexAttribute(vk::VertexInputAttributeDescription {
            location,
            binding,
            format,
            offset,
        })
    }

    fn binding(b: u32, stride: u32, rate: vk::VertexInputRate) -> VertexBinding {
        VertexBinding {
            binding: b,
            stride,
            input_rate: rate,
            divisor: 1,
        }
    }

    #[test]
    fn dynamic_input_is_empty() {
        let r = reduce(
            &[binding(0, 16, vk::VertexInputRate::VERTEX)],
            &[attr(0, 0, vk::Format::R32G32_SFLOAT, 0)],
            true,
        );
        assert!(r.dynamic);
        assert_eq!(r.attribute_mask, 0);
    }

    #[test]
    fn instance_rate_and_divisors() {
        let mut b = binding(1, 8, vk::VertexInputRate::INSTANCE);
        b.divisor = 4;
        let r = reduce(
            &[binding(0, 16, vk::VertexInputRate::VERTEX), b],
            &[
                attr(0, 0, vk::Format::R32G32B32A32_SFLOAT, 0),
                attr(1, 1, vk::Format::R32G32_SFLOAT, 0),
            ],
            false,
        );
        assert_eq!(r.instance_rate_inputs, 0b10);
        assert_eq!(r.nontrivial_divisors, 0b10);
        assert_eq!(r.divisors[1], 4);
    }

    #[test]
    fn alpha_adjust_kinds() {
        let r = reduce(
            &[binding(0, 4, vk::VertexInputRate::VERTEX)],
            &[attr(0, 0, vk::Format::A2R10G10B10_SNORM_PACK32, 0)],
            false,
        );
        assert_eq!(r.alpha_adjust_lo & 1, 1);
        assert_eq!(r.alpha_adjust_hi & 1, 0);

        let r = reduce(
            &[binding(0, 4, vk::VertexInputRate::VERTEX)],
            &[attr(0, 0, vk::Format::A2R10G10B10_SSCALED_PACK32, 0)],
            false,
        );
        assert_eq!(r.alpha_adjust_lo & 1, 0);
        assert_eq!(r.alpha_adjust_hi & 1, 1);
    }

    #[test]
    fn misaligned_attribute_does_not_contribute_alignment() {
        let r = reduce(
            &[binding(0, 10, vk::VertexInputRate::VERTEX)],
            &[
                attr(0, 0, vk::Format::R32_SFLOAT, 0),
                attr(1, 0, vk::Format::R32_SFLOAT, 6),
            ],
            false,
        );
        // Attribute 1 has offset 6 and the stride is 10: never dword aligned.
        assert_eq!(r.misaligned_mask, 0b11);
        assert_eq!(r.binding_align[0], 0);
    }

    #[test]
    fn post_shuffle_for_bgra() {
        let r = reduce(
            &[binding(0, 4, vk::VertexInputRate::VERTEX)],
            &[attr(0, 0, vk::Format::B8G8R8A8_UNORM, 0)],
            false,
        );
        assert_eq!(r.post_shuffle, 1);
    }
}
