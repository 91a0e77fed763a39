use ash::vk;

pub struct Queue {
    pub family: QueueFamily,
    pub handle: vk::Queue,
}

impl Queue {
    pub fn new(
        family: QueueFamily,
        handle: vk::Queue,
    ) -> Self {
        Self {
            family,
            handle,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueFamily {
    pub index: u32,
    pub properties: vk::QueueFamilyProperties,
}

impl QueueFamily {
    pub fn new(index: u32, properties: vk::QueueFamilyProperties) -> Self {
        Self { index, properties }
    }
}

/// Index of the first family that can draw and, when a surface is involved, present to it.
pub fn find_graphics_family(
    families: &[vk::QueueFamilyProperties],
    supports_present: impl Fn(u32) -> bool,
) -> Option<u32> {
    families
        .iter()
        .enumerate()
        .position(|(i, family)| {
            family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                && family.queue_count > 0
                && supports_present(i as u32)
        })
        .map(|i| i as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn graphics_family_must_also_present() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
        ];
        assert_eq!(find_graphics_family(&families, |_| true), Some(1));
        assert_eq!(find_graphics_family(&families, |i| i == 2), Some(2));
        assert_eq!(find_graphics_family(&families, |i| i == 0), None);
    }
}
