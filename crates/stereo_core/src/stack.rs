//! Matrix stacks with scoped push/pop.
//!
//! A [`MatrixStack`] is a LIFO of `Mat4` that is never empty; the bottom
//! element starts as identity. The mutating operations post-multiply the
//! top (`top = top * T`), i.e. they apply in the current local frame, which
//! is the conventional scene-graph "multiply on the right" semantics.
//! [`MatrixStack::pre_multiply`] exists for the one place that needs the
//! opposite: composing a world-to-eye transform in front of a modelview the
//! scene has already built.
//!
//! Balance across arbitrary nested rendering code is guaranteed by the
//! scoped [`MatrixStack::with_push`] idiom, which pops on every exit path
//! including panics. Unbalanced manual push/pop is a programming error:
//! popping the last element panics rather than silently producing a wrong
//! but plausible-looking frame.

use glam::{Mat4, Quat, Vec3, Vec4};

#[derive(Debug, Clone)]
pub struct MatrixStack {
    mats: Vec<Mat4>,
}

impl Default for MatrixStack {
    fn default() -> Self {
        Self::new()
    }
}

impl MatrixStack {
    pub fn new() -> Self {
        Self {
            mats: vec![Mat4::IDENTITY],
        }
    }

    pub fn depth(&self) -> usize {
        self.mats.len()
    }

    /// Current top transform.
    pub fn top(&self) -> Mat4 {
        *self.mats.last().expect("matrix stack is never empty")
    }

    pub fn top_mut(&mut self) -> &mut Mat4 {
        self.mats.last_mut().expect("matrix stack is never empty")
    }

    /// Duplicates the current top and pushes the duplicate.
    pub fn push(&mut self) -> &mut Self {
        self.mats.push(self.top());
        self
    }

    /// Pushes an explicit transform.
    pub fn push_transform(&mut self, m: Mat4) -> &mut Self {
        self.mats.push(m);
        self
    }

    /// Removes the top.
    ///
    /// # Panics
    /// Panics if the stack holds a single element: that indicates
    /// mismatched push/pop in calling code, which is not recoverable.
    pub fn pop(&mut self) -> &mut Self {
        assert!(
            self.mats.len() > 1,
            "MatrixStack::pop would empty the stack: unbalanced push/pop"
        );
        self.mats.pop();
        self
    }

    /// Sets the top to identity.
    pub fn identity(&mut self) -> &mut Self {
        *self.top_mut() = Mat4::IDENTITY;
        self
    }

    pub fn translate(&mut self, v: Vec3) -> &mut Self {
        self.post_multiply(Mat4::from_translation(v))
    }

    pub fn scale(&mut self, v: Vec3) -> &mut Self {
        self.post_multiply(Mat4::from_scale(v))
    }

    pub fn scale_uniform(&mut self, s: f32) -> &mut Self {
        self.scale(Vec3::splat(s))
    }

    pub fn rotate(&mut self, angle_rad: f32, axis: Vec3) -> &mut Self {
        self.post_multiply(Mat4::from_axis_angle(axis, angle_rad))
    }

    pub fn rotate_quat(&mut self, q: Quat) -> &mut Self {
        self.post_multiply(Mat4::from_quat(q))
    }

    /// `top = top * m`.
    pub fn transform(&mut self, m: Mat4) -> &mut Self {
        self.post_multiply(m)
    }

    /// `top = m * top`.
    pub fn pre_multiply(&mut self, m: Mat4) -> &mut Self {
        let top = self.top_mut();
        *top = m * *top;
        self
    }

    /// `top = top * m`.
    pub fn post_multiply(&mut self, m: Mat4) -> &mut Self {
        let top = self.top_mut();
        *top = *top * m;
        self
    }

    /// Zeroes the translation column, preserving rotation/scale. Used to
    /// strip translation for skybox-style rendering where only orientation
    /// should affect the result.
    pub fn untranslate(&mut self) -> &mut Self {
        self.top_mut().w_axis = Vec4::new(0.0, 0.0, 0.0, 1.0);
        self
    }

    /// Cancels the rotational component, preserving translation. Used for
    /// billboard-style constructs.
    pub fn unrotate(&mut self) -> &mut Self {
        let (_, rotation, _) = self.top().to_scale_rotation_translation();
        self.post_multiply(Mat4::from_quat(rotation.inverse()))
    }

    /// Scoped push: duplicates the top, runs `f`, and pops on every exit
    /// path (including panics).
    pub fn with_push<R>(&mut self, f: impl FnOnce(&mut MatrixStack) -> R) -> R {
        self.push();
        let guard = PopGuard { stack: self };
        f(&mut *guard.stack)
    }
}

struct PopGuard<'a> {
    stack: &'a mut MatrixStack,
}

impl Drop for PopGuard<'_> {
    fn drop(&mut self) {
        self.stack.pop();
    }
}

/// The two transform spaces a render loop owns. Passed explicitly by
/// reference into the frame loop and scene callbacks; there are no global
/// stacks.
#[derive(Debug, Default)]
pub struct RenderContext {
    pub projection: MatrixStack,
    pub modelview: MatrixStack,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scoped push of both stacks.
    pub fn with_push<R>(&mut self, f: impl FnOnce(&mut RenderContext) -> R) -> R {
        self.projection.push();
        self.modelview.push();
        let guard = CtxPopGuard { ctx: self };
        f(&mut *guard.ctx)
    }

    /// Scoped push of both stacks with both tops reset to identity. Used
    /// for full-screen overlay quads drawn without the scene transforms.
    pub fn with_identity<R>(&mut self, f: impl FnOnce(&mut RenderContext) -> R) -> R {
        self.with_push(|ctx| {
            ctx.projection.identity();
            ctx.modelview.identity();
            f(ctx)
        })
    }
}

struct CtxPopGuard<'a> {
    ctx: &'a mut RenderContext,
}

impl Drop for CtxPopGuard<'_> {
    fn drop(&mut self) {
        self.ctx.projection.pop();
        self.ctx.modelview.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec3;

    #[test]
    fn starts_with_identity() {
        let stack = MatrixStack::new();
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.top(), Mat4::IDENTITY);
    }

    #[test]
    fn push_duplicates_top() {
        let mut stack = MatrixStack::new();
        stack.translate(vec3(1.0, 2.0, 3.0));
        let before = stack.top();
        stack.push();
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.top(), before);
        stack.pop();
        assert_eq!(stack.top(), before);
    }

    #[test]
    #[should_panic(expected = "unbalanced push/pop")]
    fn pop_at_depth_one_panics() {
        MatrixStack::new().pop();
    }

    #[test]
    fn operations_post_multiply() {
        let mut stack = MatrixStack::new();
        let t = Mat4::from_translation(vec3(0.0, 1.0, 0.0));
        let r = Mat4::from_axis_angle(Vec3::Y, 0.5);
        stack.transform(t).rotate(0.5, Vec3::Y);
        assert!(stack.top().abs_diff_eq(t * r, 1e-6));
    }

    #[test]
    fn pre_multiply_composes_in_front() {
        let mut stack = MatrixStack::new();
        let world = Mat4::from_translation(vec3(0.0, 0.0, -5.0));
        let head = Mat4::from_translation(vec3(0.1, 0.0, 0.0));
        stack.transform(world).pre_multiply(head.inverse());
        assert!(stack.top().abs_diff_eq(head.inverse() * world, 1e-6));
    }

    #[test]
    fn untranslate_preserves_rotation() {
        let mut stack = MatrixStack::new();
        stack
            .translate(vec3(3.0, 4.0, 5.0))
            .rotate(1.0, Vec3::Z)
            .untranslate();
        let top = stack.top();
        assert_eq!(top.w_axis, Vec4::new(0.0, 0.0, 0.0, 1.0));
        let expected = Mat4::from_axis_angle(Vec3::Z, 1.0);
        assert!(top.x_axis.abs_diff_eq(expected.x_axis, 1e-6));
    }

    #[test]
    fn unrotate_preserves_translation() {
        let mut stack = MatrixStack::new();
        stack.translate(vec3(3.0, 4.0, 5.0)).rotate(1.0, Vec3::Y);
        stack.unrotate();
        let top = stack.top();
        assert!(top.abs_diff_eq(Mat4::from_translation(vec3(3.0, 4.0, 5.0)), 1e-5));
    }

    #[test]
    fn with_push_restores_depth_on_panic() {
        let mut stack = MatrixStack::new();
        stack.push();
        let depth = stack.depth();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            stack.with_push(|s| {
                s.translate(vec3(1.0, 0.0, 0.0));
                panic!("scene blew up");
            })
        }));
        assert!(result.is_err());
        assert_eq!(stack.depth(), depth);
    }

    #[test]
    fn context_with_identity_scopes_both_stacks() {
        let mut ctx = RenderContext::new();
        ctx.projection.translate(vec3(1.0, 0.0, 0.0));
        ctx.modelview.translate(vec3(0.0, 1.0, 0.0));
        let (p, m) = (ctx.projection.top(), ctx.modelview.top());
        ctx.with_identity(|ctx| {
            assert_eq!(ctx.projection.top(), Mat4::IDENTITY);
            assert_eq!(ctx.modelview.top(), Mat4::IDENTITY);
        });
        assert_eq!(ctx.projection.top(), p);
        assert_eq!(ctx.modelview.top(), m);
        assert_eq!(ctx.projection.depth(), 1);
        assert_eq!(ctx.modelview.depth(), 1);
    }
}
