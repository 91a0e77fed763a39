use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use crate::renderer::passes::{Pass, RecordPass, RenderPassBegin, RenderPassEncoder, Subpass};

/// A tuple of passes, in subpass order.
pub trait PassChain {
    fn resize_chain(&mut self, extent: vk::Extent2D) -> Result<()>;
}

/// A tuple of passes recorded back to back, advancing one subpass between each.
pub trait RecordChain<E>: PassChain {
    fn record_chain(&self, encoder: &mut E) -> Result<()>;
}

/// A tuple of `FnOnce(Subpass) -> Result<Pass>` builders, called in order with indices 0..LEN.
pub trait PassBuilders<P> {
    const LEN: u32;
    fn build(self, render_pass: vk::RenderPass) -> Result<P>;
}

macro_rules! impl_pass_tuples {
    ($len:expr; $f0:ident $p0:ident $i0:tt $(, $f:ident $p:ident $i:tt)*) => {
        impl<$p0: Pass $(, $p: Pass)*> PassChain for ($p0, $($p,)*) {
            fn resize_chain(&mut self, extent: vk::Extent2D) -> Result<()> {
                self.$i0.resize(extent)?;
                $(self.$i.resize(extent)?;)*
                Ok(())
            }
        }

        impl<E, $p0 $(, $p)*> RecordChain<E> for ($p0, $($p,)*)
        where
            E: RenderPassEncoder,
            $p0: RecordPass<E>,
            $($p: RecordPass<E>,)*
        {
            fn record_chain(&self, encoder: &mut E) -> Result<()> {
                self.$i0.record_pass(encoder)?;
                $(
                    encoder.next_subpass();
                    self.$i.record_pass(encoder)?;
                )*
                Ok(())
            }
        }

        impl<$f0, $p0 $(, $f, $p)*> PassBuilders<($p0, $($p,)*)> for ($f0, $($f,)*)
        where
            $f0: FnOnce(Subpass) -> Result<$p0>,
            $($f: FnOnce(Subpass) -> Result<$p>,)*
        {
            const LEN: u32 = $len;

            fn build(self, render_pass: vk::RenderPass) -> Result<($p0, $($p,)*)> {
                Ok((
                    (self.$i0)(Subpass { render_pass, index: $i0 })?,
                    $((self.$i)(Subpass { render_pass, index: $i })?,)*
                ))
            }
        }
    };
}

impl_pass_tuples!(1; F0 P0 0);
impl_pass_tuples!(2; F0 P0 0, F1 P1 1);
impl_pass_tuples!(3; F0 P0 0, F1 P1 1, F2 P2 2);
impl_pass_tuples!(4; F0 P0 0, F1 P1 1, F2 P2 2, F3 P3 3);

/// Owns one pass per subpass of a render pass, in subpass order.
///
/// Recording emits begin, pass 0, then next-subpass before each later pass, then end.
pub struct MultiPass<P> {
    render_pass: vk::RenderPass,
    passes: P,
}

impl<P> MultiPass<P> {
    /// Builds every pass against `render_pass`. The builder count must match `subpass_count`.
    pub fn new<B>(
        render_pass: vk::RenderPass,
        subpass_count: u32,
        builders: B,
    ) -> Result<Self>
    where
        B: PassBuilders<P>,
    {
        if B::LEN != subpass_count {
            return Err(eyre!(
                "{} passes supplied for a render pass with {} subpasses",
                B::LEN,
                subpass_count,
            ));
        }

        Ok(Self {
            render_pass,
            passes: builders.build(render_pass)?,
        })
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn passes(&self) -> &P {
        &self.passes
    }

    pub fn passes_mut(&mut self) -> &mut P {
        &mut self.passes
    }

    pub fn record<E>(
        &self,
        encoder: &mut E,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: [vk::ClearValue; 2],
    ) -> Result<()>
    where
        E: RenderPassEncoder,
        P: RecordChain<E>,
    {
        encoder.begin_render_pass(&RenderPassBegin {
            render_pass: self.render_pass,
            framebuffer,
            render_area,
            clear_values,
        });
        self.passes.record_chain(encoder)?;
        encoder.end_render_pass();
        Ok(())
    }

    pub fn resize(&mut self, extent: vk::Extent2D) -> Result<()>
    where
        P: PassChain,
    {
        self.passes.resize_chain(extent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Command {
        Begin(vk::Framebuffer),
        Next,
        End,
        Draw(&'static str),
    }

    #[derive(Default)]
    struct Recorder(Vec<Command>);

    impl RenderPassEncoder for Recorder {
        fn begin_render_pass(&mut self, begin: &RenderPassBegin) {
            self.0.push(Command::Begin(begin.framebuffer));
        }

        fn next_subpass(&mut self) {
            self.0.push(Command::Next);
        }

        fn end_render_pass(&mut self) {
            self.0.push(Command::End);
        }
    }

    struct Named {
        name: &'static str,
        subpass: Subpass,
        resized: Option<vk::Extent2D>,
    }

    impl Pass for Named {
        fn resize(&mut self, extent: vk::Extent2D) -> Result<()> {
            self.resized = Some(extent);
            Ok(())
        }
    }

    impl RecordPass<Recorder> for Named {
        fn record_pass(&self, encoder: &mut Recorder) -> Result<()> {
            encoder.0.push(Command::Draw(self.name));
            Ok(())
        }
    }

    fn named(name: &'static str) -> impl FnOnce(Subpass) -> Result<Named> {
        move |subpass| Ok(Named { name, subpass, resized: None })
    }

    fn clear() -> [vk::ClearValue; 2] {
        [vk::ClearValue::default(), vk::ClearValue::default()]
    }

    #[test]
    fn builders_receive_their_subpass_index() {
        let multipass: MultiPass<(Named, Named, Named)> = MultiPass::new(
            vk::RenderPass::null(),
            3,
            (named("a"), named("b"), named("c")),
        )
        .unwrap();
        let (a, b, c) = multipass.passes();
        assert_eq!((a.subpass.index, b.subpass.index, c.subpass.index), (0, 1, 2));
    }

    #[test]
    fn every_later_pass_is_preceded_by_one_advance() {
        let multipass: MultiPass<(Named, Named, Named, Named)> = MultiPass::new(
            vk::RenderPass::null(),
            4,
            (named("a"), named("b"), named("c"), named("d")),
        )
        .unwrap();
        let mut recorder = Recorder::default();
        multipass
            .record(&mut recorder, vk::Framebuffer::null(), vk::Rect2D::default(), clear())
            .unwrap();
        assert_eq!(
            recorder.0,
            [
                Command::Begin(vk::Framebuffer::null()),
                Command::Draw("a"),
                Command::Next,
                Command::Draw("b"),
                Command::Next,
                Command::Draw("c"),
                Command::Next,
                Command::Draw("d"),
                Command::End,
            ]
        );
    }

    #[test]
    fn single_pass_has_no_subpass_advance() {
        let multipass: MultiPass<(Named,)> =
            MultiPass::new(vk::RenderPass::null(), 1, (named("only"),)).unwrap();
        let mut recorder = Recorder::default();
        multipass
            .record(&mut recorder, vk::Framebuffer::null(), vk::Rect2D::default(), clear())
            .unwrap();
        assert_eq!(
            recorder.0,
            [Command::Begin(vk::Framebuffer::null()), Command::Draw("only"), Command::End]
        );
    }

    #[test]
    fn mismatched_subpass_count_is_rejected() {
        let result: Result<MultiPass<(Named, Named)>> =
            MultiPass::new(vk::RenderPass::null(), 3, (named("a"), named("b")));
        assert!(result.is_err());
    }

    #[test]
    fn builder_errors_propagate() {
        let failing = |_: Subpass| -> Result<Named> { Err(eyre!("no pipeline")) };
        let result: Result<MultiPass<(Named, Named)>> =
            MultiPass::new(vk::RenderPass::null(), 2, (named("a"), failing));
        assert!(result.is_err());
    }

    #[test]
    fn resize_reaches_every_pass() {
        let mut multipass: MultiPass<(Named, Named)> =
            MultiPass::new(vk::RenderPass::null(), 2, (named("a"), named("b"))).unwrap();
        let extent = vk::Extent2D { width: 640, height: 480 };
        multipass.resize(extent).unwrap();
        let (a, b) = multipass.passes();
        assert_eq!(a.resized.map(|e| e.width), Some(640));
        assert_eq!(b.resized.map(|e| e.height), Some(480));
    }
}
