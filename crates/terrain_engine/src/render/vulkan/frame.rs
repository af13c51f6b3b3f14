//! Frame cycling
//!
//! Hands out the next frame slot together with the next swapchain image,
//! blocking only as much as the in-flight limit and image ownership require.
//! The GPU side is reached through [`FrameOps`], which keeps the ordering
//! rules here testable without a device.

use crate::render::vulkan::VulkanResult;

/// Number of frames the host may record ahead of the GPU
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Whether the swapchain can be used as is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainState {
    /// Images can be acquired
    Stable,
    /// Rebuild before the next acquire
    PendingRebuild,
}

/// GPU operations the cycler sequences
pub trait FrameOps {
    /// Block until the slot's fence is signaled
    fn wait_slot(&mut self, slot: usize) -> VulkanResult<()>;

    /// Acquire the next image, signaling the slot's acquire semaphore
    ///
    /// `Ok(None)` means the swapchain is out of date.
    fn acquire_image(&mut self, slot: usize) -> VulkanResult<Option<u32>>;

    /// Tear down and recreate the swapchain and its framebuffers
    ///
    /// Returns the new image count, or `Ok(None)` when the surface currently
    /// has no area and the rebuild has to be retried later.
    fn rebuild_surface(&mut self) -> VulkanResult<Option<usize>>;
}

/// A slot and image ready to be recorded into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredFrame {
    /// Frame slot index in `0..MAX_FRAMES_IN_FLIGHT`
    pub slot: usize,
    /// Swapchain image index
    pub image_index: u32,
}

/// Round-robin frame slot ring plus swapchain image ownership
#[derive(Debug)]
pub struct FrameCycler {
    state: SwapchainState,
    current_slot: usize,
    image_owners: Vec<Option<usize>>,
    surface_empty: bool,
}

impl FrameCycler {
    /// Start a cycle over `image_count` swapchain images
    pub fn new(image_count: usize) -> Self {
        Self {
            state: SwapchainState::Stable,
            // First advance lands on slot 0
            current_slot: MAX_FRAMES_IN_FLIGHT - 1,
            image_owners: vec![None; image_count],
            surface_empty: false,
        }
    }

    /// Current swapchain state
    pub fn state(&self) -> SwapchainState {
        self.state
    }

    /// Whether the last rebuild was postponed because the surface had no area
    ///
    /// Nothing can be drawn until the window system reports a new size.
    pub fn surface_empty(&self) -> bool {
        self.surface_empty
    }

    /// Slot handed out by the last successful advance
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    /// Number of swapchain images being tracked
    pub fn image_count(&self) -> usize {
        self.image_owners.len()
    }

    /// Slot that last acquired `image_index`, if any
    pub fn image_owner(&self, image_index: u32) -> Option<usize> {
        self.image_owners.get(image_index as usize).copied().flatten()
    }

    /// Defer a swapchain rebuild to the next acquire
    pub fn request_rebuild(&mut self) {
        if self.state == SwapchainState::Stable {
            log::debug!("Swapchain rebuild requested");
        }
        self.state = SwapchainState::PendingRebuild;
    }

    /// Forget image ownership and track `image_count` fresh images
    pub fn reset_images(&mut self, image_count: usize) {
        self.image_owners.clear();
        self.image_owners.resize(image_count, None);
    }

    /// Hand out the next slot and image
    ///
    /// Returns `Ok(None)` when the swapchain is out of date or cannot be
    /// rebuilt yet; the caller skips the frame and tries again.
    pub fn acquire<O: FrameOps>(&mut self, ops: &mut O) -> VulkanResult<Option<AcquiredFrame>> {
        if self.state == SwapchainState::PendingRebuild {
            match ops.rebuild_surface()? {
                Some(image_count) => {
                    self.reset_images(image_count);
                    self.state = SwapchainState::Stable;
                    self.surface_empty = false;
                    log::debug!("Swapchain rebuilt with {} images", image_count);
                }
                None => {
                    self.surface_empty = true;
                    return Ok(None);
                }
            }
        }

        self.current_slot = (self.current_slot + 1) % MAX_FRAMES_IN_FLIGHT;
        let slot = self.current_slot;
        ops.wait_slot(slot)?;

        let Some(image_index) = ops.acquire_image(slot)? else {
            log::warn!("Swapchain out of date on acquire");
            self.state = SwapchainState::PendingRebuild;
            return Ok(None);
        };

        let index = image_index as usize;
        if index >= self.image_owners.len() {
            self.image_owners.resize(index + 1, None);
        }
        if let Some(owner) = self.image_owners[index] {
            if owner != slot {
                ops.wait_slot(owner)?;
            }
        }
        self.image_owners[index] = Some(slot);

        Ok(Some(AcquiredFrame { slot, image_index }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Acquire(usize),
        Rebuild,
    }

    /// Scripted device: acquire results and rebuild results are queued up front
    #[derive(Default)]
    struct MockOps {
        calls: Vec<Call>,
        images: VecDeque<Option<u32>>,
        rebuilds: VecDeque<Option<usize>>,
    }

    impl MockOps {
        fn with_images(images: &[Option<u32>]) -> Self {
            Self {
                images: images.iter().copied().collect(),
                ..Default::default()
            }
        }
    }

    impl FrameOps for MockOps {
        fn wait_slot(&mut self, slot: usize) -> VulkanResult<()> {
            self.calls.push(Call::Wait(slot));
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> VulkanResult<Option<u32>> {
            self.calls.push(Call::Acquire(slot));
            Ok(self.images.pop_front().flatten())
        }

        fn rebuild_surface(&mut self) -> VulkanResult<Option<usize>> {
            self.calls.push(Call::Rebuild);
            Ok(self.rebuilds.pop_front().unwrap_or(Some(3)))
        }
    }

    #[test]
    fn test_slots_round_robin_with_wait_before_acquire() {
        let mut ops = MockOps::with_images(&[Some(0), Some(1), Some(2), Some(0)]);
        let mut cycler = FrameCycler::new(3);

        let slots: Vec<usize> = (0..4)
            .map(|_| cycler.acquire(&mut ops).unwrap().unwrap().slot)
            .collect();
        assert_eq!(slots, vec![0, 1, 0, 1]);

        for pair in ops.calls.windows(2) {
            if let [_, Call::Acquire(slot)] = pair {
                assert_eq!(pair[0], Call::Wait(*slot));
            }
        }
    }

    #[test]
    fn test_third_acquire_waits_on_first_slot() {
        let mut ops = MockOps::with_images(&[Some(0), Some(1), Some(2)]);
        let mut cycler = FrameCycler::new(3);

        for _ in 0..3 {
            cycler.acquire(&mut ops).unwrap();
        }

        assert_eq!(
            ops.calls,
            vec![
                Call::Wait(0), Call::Acquire(0),
                Call::Wait(1), Call::Acquire(1),
                Call::Wait(0), Call::Acquire(0),
            ]
        );
    }

    #[test]
    fn test_image_reacquired_by_other_slot_waits_on_owner() {
        // Slot 0 takes image 0, then slot 1 is handed image 0 again
        let mut ops = MockOps::with_images(&[Some(0), Some(0)]);
        let mut cycler = FrameCycler::new(2);

        cycler.acquire(&mut ops).unwrap();
        let frame = cycler.acquire(&mut ops).unwrap().unwrap();

        assert_eq!(frame, AcquiredFrame { slot: 1, image_index: 0 });
        assert_eq!(&ops.calls[2..], &[Call::Wait(1), Call::Acquire(1), Call::Wait(0)]);
        assert_eq!(cycler.image_owner(0), Some(1));
    }

    #[test]
    fn test_image_reacquired_by_same_slot_does_not_wait_twice() {
        let mut ops = MockOps::with_images(&[Some(1), Some(0), Some(1)]);
        let mut cycler = FrameCycler::new(2);

        for _ in 0..3 {
            cycler.acquire(&mut ops).unwrap();
        }

        // Third frame is slot 0 with image 1, which slot 0 already owned
        assert_eq!(&ops.calls[4..], &[Call::Wait(0), Call::Acquire(0)]);
    }

    #[test]
    fn test_out_of_date_defers_rebuild_to_next_acquire() {
        let mut ops = MockOps::with_images(&[None, Some(2)]);
        let mut cycler = FrameCycler::new(2);

        assert!(cycler.acquire(&mut ops).unwrap().is_none());
        assert_eq!(cycler.state(), SwapchainState::PendingRebuild);
        assert!(!ops.calls.contains(&Call::Rebuild));
        // Out of date is not the same as having nothing to draw into
        assert!(!cycler.surface_empty());

        let frame = cycler.acquire(&mut ops).unwrap().unwrap();
        assert_eq!(cycler.state(), SwapchainState::Stable);
        assert_eq!(ops.calls[2], Call::Rebuild);
        assert_eq!(cycler.image_count(), 3);
        assert_eq!(frame, AcquiredFrame { slot: 1, image_index: 2 });
    }

    #[test]
    fn test_rebuild_resets_ownership_to_same_count() {
        let mut ops = MockOps::with_images(&[Some(0), Some(1), Some(0)]);
        ops.rebuilds = vec![Some(3), Some(3)].into();
        let mut cycler = FrameCycler::new(3);

        cycler.acquire(&mut ops).unwrap();
        cycler.acquire(&mut ops).unwrap();

        cycler.request_rebuild();
        cycler.acquire(&mut ops).unwrap();
        assert_eq!(cycler.image_count(), 3);
        assert_eq!(cycler.image_owner(1), None);

        cycler.request_rebuild();
        cycler.acquire(&mut ops).unwrap();
        assert_eq!(cycler.image_count(), 3);
    }

    #[test]
    fn test_rebuild_forgets_previous_owner() {
        // Image 0 owned by slot 0 before the rebuild; after it, slot 1 gets
        // image 0 without waiting on slot 0
        let mut ops = MockOps::with_images(&[Some(0), Some(0)]);
        let mut cycler = FrameCycler::new(2);

        cycler.acquire(&mut ops).unwrap();
        cycler.request_rebuild();
        cycler.acquire(&mut ops).unwrap();

        assert_eq!(&ops.calls[2..], &[Call::Rebuild, Call::Wait(1), Call::Acquire(1)]);
    }

    #[test]
    fn test_zero_sized_surface_keeps_rebuild_pending() {
        let mut ops = MockOps::with_images(&[Some(0)]);
        ops.rebuilds = vec![None, Some(2)].into();
        let mut cycler = FrameCycler::new(2);
        cycler.request_rebuild();

        assert!(cycler.acquire(&mut ops).unwrap().is_none());
        assert_eq!(cycler.state(), SwapchainState::PendingRebuild);
        assert!(cycler.surface_empty());
        assert_eq!(ops.calls, vec![Call::Rebuild]);

        let frame = cycler.acquire(&mut ops).unwrap().unwrap();
        assert_eq!(frame.slot, 0);
        assert_eq!(cycler.state(), SwapchainState::Stable);
        assert!(!cycler.surface_empty());
    }
}
