use std::cell::RefCell;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use strata::renderer::passes::{MultiPass, Pass, RecordPass, RenderPassBegin, RenderPassEncoder, Subpass};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Begin { framebuffer: vk::Framebuffer, width: u32, stencil: u32 },
    Next,
    End,
    Overlay { draws: usize },
    Scene { index_count: u32 },
}

#[derive(Default)]
struct MockEncoder {
    events: Vec<Event>,
}

impl RenderPassEncoder for MockEncoder {
    fn begin_render_pass(&mut self, begin: &RenderPassBegin) {
        self.events.push(Event::Begin {
            framebuffer: begin.framebuffer,
            width: begin.render_area.extent.width,
            stencil: unsafe { begin.clear_values[1].depth_stencil.stencil },
        });
    }

    fn next_subpass(&mut self) {
        self.events.push(Event::Next);
    }

    fn end_render_pass(&mut self) {
        self.events.push(Event::End);
    }
}

struct FakeOverlay {
    draws: usize,
}

impl Pass for FakeOverlay {
    fn resize(&mut self, _extent: vk::Extent2D) -> Result<()> {
        // Draw lists are rebuilt every frame
        self.draws = 0;
        Ok(())
    }
}

impl RecordPass<MockEncoder> for FakeOverlay {
    fn record_pass(&self, encoder: &mut MockEncoder) -> Result<()> {
        encoder.events.push(Event::Overlay { draws: self.draws });
        Ok(())
    }
}

struct FakeScene {
    subpass: Subpass,
    index_count: u32,
    extents: RefCell<Vec<vk::Extent2D>>,
    fail_recording: bool,
}

impl Pass for FakeScene {
    fn resize(&mut self, extent: vk::Extent2D) -> Result<()> {
        self.extents.borrow_mut().push(extent);
        Ok(())
    }
}

impl RecordPass<MockEncoder> for FakeScene {
    fn record_pass(&self, encoder: &mut MockEncoder) -> Result<()> {
        if self.fail_recording {
            return Err(eyre!("pipeline missing"));
        }
        encoder.events.push(Event::Scene { index_count: self.index_count });
        Ok(())
    }
}

fn build(fail_recording: bool) -> MultiPass<(FakeOverlay, FakeScene)> {
    MultiPass::new(
        vk::RenderPass::null(),
        2,
        (
            |_: Subpass| -> Result<FakeOverlay> { Ok(FakeOverlay { draws: 3 }) },
            move |subpass: Subpass| -> Result<FakeScene> {
                Ok(FakeScene {
                    subpass,
                    index_count: 36,
                    extents: RefCell::new(Vec::new()),
                    fail_recording,
                })
            },
        ),
    )
    .unwrap()
}

fn render_area(width: u32, height: u32) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D::default(),
        extent: vk::Extent2D { width, height },
    }
}

#[test]
fn two_passes_record_inside_one_render_pass() {
    let multipass = build(false);
    let mut encoder = MockEncoder::default();
    let clear = strata::renderer::passes::render_pass::clear_values([0.1, 0.1, 0.1, 1.0]);

    multipass
        .record(&mut encoder, vk::Framebuffer::null(), render_area(800, 600), clear)
        .unwrap();

    assert_eq!(
        encoder.events,
        [
            Event::Begin { framebuffer: vk::Framebuffer::null(), width: 800, stencil: 0 },
            Event::Overlay { draws: 3 },
            Event::Next,
            Event::Scene { index_count: 36 },
            Event::End,
        ]
    );
}

#[test]
fn second_pass_is_built_for_subpass_one() {
    let multipass = build(false);
    let (_, scene) = multipass.passes();
    assert_eq!(scene.subpass.index, 1);
    assert_eq!(scene.subpass.render_pass, multipass.render_pass());
}

#[test]
fn resize_visits_passes_in_order() {
    let mut multipass = build(false);
    let extent = vk::Extent2D { width: 1024, height: 768 };
    multipass.resize(extent).unwrap();
    multipass.resize(extent).unwrap();

    let (overlay, scene) = multipass.passes();
    assert_eq!(overlay.draws, 0);
    assert_eq!(scene.extents.borrow().as_slice(), [extent, extent]);
}

#[test]
fn recording_error_stops_before_end() {
    let multipass = build(true);
    let mut encoder = MockEncoder::default();
    let clear = strata::renderer::passes::render_pass::clear_values([0.0; 4]);

    let result = multipass.record(&mut encoder, vk::Framebuffer::null(), render_area(1, 1), clear);
    assert!(result.is_err());
    assert_eq!(encoder.events.last(), Some(&Event::Next));
}

#[test]
fn passes_mut_reaches_per_frame_state() {
    let mut multipass = build(false);
    multipass.passes_mut().0.draws = 11;
    let mut encoder = MockEncoder::default();
    let clear = strata::renderer::passes::render_pass::clear_values([0.0; 4]);
    multipass
        .record(&mut encoder, vk::Framebuffer::null(), render_area(2, 2), clear)
        .unwrap();
    assert!(encoder.events.contains(&Event::Overlay { draws: 11 }));
}
