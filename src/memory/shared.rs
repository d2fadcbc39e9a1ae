//! Shared memory segments and typed views
//!
//! Named fixed-size byte regions shared by reference between the
//! orchestrating thread and workers, so large numeric buffers (flock
//! positions, grids) cross the thread boundary without copies. A segment
//! carries one primary element type; additional views can reinterpret the
//! same bytes at a different type or window (type punning).
//!
//! The manager allocates and names segments but does not arbitrate access:
//! callers must partition each buffer so that at most one writer touches
//! any given region per frame (e.g. one worker per slice of a position
//! array). That contract is documented on [`TypedView`], not enforced.

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use bytemuck::Pod;
use serde::{Deserialize, Serialize};

use crate::core::config::config;
use crate::core::error::{Result, SimError};

/// Element types a segment or view can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    F32,
    I32,
    U32,
    I16,
    U8,
}

impl ElementType {
    pub fn byte_width(self) -> usize {
        match self {
            ElementType::F32 | ElementType::I32 | ElementType::U32 => 4,
            ElementType::I16 => 2,
            ElementType::U8 => 1,
        }
    }
}

/// A named, fixed-size byte region
///
/// # Safety
///
/// The backing bytes sit in an `UnsafeCell` and the segment is shared
/// across threads behind an `Arc`. All access goes through bounds-checked
/// raw-pointer reads and writes on [`TypedView`]; no `&`/`&mut` reference
/// to the bytes is ever formed, so the usual aliasing rules reduce to the
/// documented caller obligation: at most one writer per region per frame,
/// and no reader of a region while it is being written.
pub struct SharedSegment {
    name: String,
    ty: ElementType,
    len: usize,
    bytes: UnsafeCell<Box<[u8]>>,
}

unsafe impl Send for SharedSegment {}
unsafe impl Sync for SharedSegment {}

impl SharedSegment {
    fn new(name: String, len: usize, ty: ElementType) -> Self {
        let byte_len = len * ty.byte_width();
        Self {
            name,
            ty,
            len,
            bytes: UnsafeCell::new(vec![0u8; byte_len].into_boxed_slice()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn element_type(&self) -> ElementType {
        self.ty
    }

    /// Length in elements of the primary type
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn byte_len(&self) -> usize {
        self.len * self.ty.byte_width()
    }

    fn base_ptr(&self) -> *mut u8 {
        // Safe: only produces the pointer; all dereferences are
        // bounds-checked at the view layer.
        unsafe { (*self.bytes.get()).as_mut_ptr() }
    }
}

impl fmt::Debug for SharedSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSegment")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("len", &self.len)
            .finish()
    }
}

/// Typed, bounds-checked window into a shared segment
///
/// Cloning a view is cheap (an `Arc` bump); clones alias the same bytes.
/// Concurrency contract: callers partition the underlying buffer so at
/// most one writer touches any element range per frame. The view checks
/// bounds and element width, never who is writing.
#[derive(Clone)]
pub struct TypedView {
    segment: Arc<SharedSegment>,
    ty: ElementType,
    byte_offset: usize,
    len: usize,
}

impl TypedView {
    fn full(segment: Arc<SharedSegment>) -> Self {
        let ty = segment.element_type();
        let len = segment.len();
        Self { segment, ty, byte_offset: 0, len }
    }

    pub fn segment_name(&self) -> &str {
        self.segment.name()
    }

    pub fn element_type(&self) -> ElementType {
        self.ty
    }

    /// Length in elements of the view's type
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn check_access<T: Pod>(&self, start: usize, count: usize) -> Result<()> {
        let width = std::mem::size_of::<T>();
        if width != self.ty.byte_width() {
            return Err(SimError::ElementTypeMismatch {
                expected: self.ty,
                actual: width,
            });
        }
        if start + count > self.len {
            return Err(SimError::ViewOutOfRange {
                offset: self.byte_offset + start * width,
                len: count * width,
                capacity: self.segment.byte_len(),
            });
        }
        Ok(())
    }

    #[inline]
    fn element_ptr<T: Pod>(&self, index: usize) -> *mut u8 {
        let width = std::mem::size_of::<T>();
        // Bounds verified by check_access before any call
        unsafe { self.segment.base_ptr().add(self.byte_offset + index * width) }
    }

    /// Read one element; `T` must match the view's element width
    pub fn read<T: Pod>(&self, index: usize) -> Result<T> {
        self.check_access::<T>(index, 1)?;
        // Unaligned read: segment bases are byte-aligned only
        Ok(unsafe { (self.element_ptr::<T>(index) as *const T).read_unaligned() })
    }

    /// Write one element; `T` must match the view's element width
    pub fn write<T: Pod>(&self, index: usize, value: T) -> Result<()> {
        self.check_access::<T>(index, 1)?;
        unsafe { (self.element_ptr::<T>(index) as *mut T).write_unaligned(value) };
        Ok(())
    }

    /// Copy a slice into the view starting at element `start`
    pub fn write_slice<T: Pod>(&self, start: usize, src: &[T]) -> Result<()> {
        self.check_access::<T>(start, src.len())?;
        let bytes: &[u8] = bytemuck::cast_slice(src);
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.element_ptr::<T>(start), bytes.len());
        }
        Ok(())
    }

    /// Copy out of the view starting at element `start`, filling `dst`
    pub fn read_slice<T: Pod>(&self, start: usize, dst: &mut [T]) -> Result<()> {
        self.check_access::<T>(start, dst.len())?;
        let byte_len = std::mem::size_of_val(dst);
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.element_ptr::<T>(start),
                bytemuck::cast_slice_mut::<T, u8>(dst).as_mut_ptr(),
                byte_len,
            );
        }
        Ok(())
    }

    /// Snapshot the whole view into an owned vec
    pub fn to_vec<T: Pod + Default + Clone>(&self) -> Result<Vec<T>> {
        let mut out = vec![T::default(); self.len];
        self.read_slice(0, &mut out)?;
        Ok(out)
    }
}

impl fmt::Debug for TypedView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedView")
            .field("segment", &self.segment.name())
            .field("ty", &self.ty)
            .field("byte_offset", &self.byte_offset)
            .field("len", &self.len)
            .finish()
    }
}

/// Allocates, names and hands out shared segments
///
/// Owned by the orchestrating thread; workers only ever hold views.
pub struct SharedMemoryManager {
    buffers: AHashMap<String, Arc<SharedSegment>>,
    budget_bytes: usize,
    allocated_bytes: usize,
    enabled: bool,
}

impl SharedMemoryManager {
    /// Manager with the budget from [`config`]
    pub fn new() -> Self {
        Self::with_budget(config().shared_memory_budget)
    }

    pub fn with_budget(budget_bytes: usize) -> Self {
        Self {
            buffers: AHashMap::new(),
            budget_bytes,
            allocated_bytes: 0,
            enabled: true,
        }
    }

    /// Manager that refuses every allocation
    ///
    /// Stands in for a host without a shared-memory primitive; callers
    /// exercise their copy-based fallback against it.
    pub fn disabled() -> Self {
        Self {
            buffers: AHashMap::new(),
            budget_bytes: 0,
            allocated_bytes: 0,
            enabled: false,
        }
    }

    pub fn is_available(&self) -> bool {
        self.enabled
    }

    /// Bytes currently allocated across all segments
    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes
    }

    /// Allocate a named segment of `len` elements and return a full view
    ///
    /// Returns None (with a logged warning) when shared memory is
    /// unavailable, the length is zero, or the allocation would exceed
    /// the budget. A name collision replaces the previous segment; views
    /// into the old segment stay valid but are no longer reachable by
    /// name.
    pub fn create_buffer(&mut self, name: &str, len: usize, ty: ElementType) -> Option<TypedView> {
        if !self.enabled {
            tracing::warn!("shared memory unavailable; cannot create '{}'", name);
            return None;
        }
        if len == 0 {
            tracing::warn!("refusing zero-length shared buffer '{}'", name);
            return None;
        }

        let byte_len = len * ty.byte_width();
        let freed = self
            .buffers
            .get(name)
            .map(|old| old.byte_len())
            .unwrap_or(0);
        if self.allocated_bytes - freed + byte_len > self.budget_bytes {
            tracing::warn!(
                "shared buffer '{}' ({} bytes) would exceed the {} byte budget",
                name,
                byte_len,
                self.budget_bytes
            );
            return None;
        }

        let segment = Arc::new(SharedSegment::new(name.to_string(), len, ty));
        self.allocated_bytes = self.allocated_bytes - freed + byte_len;
        self.buffers.insert(name.to_string(), Arc::clone(&segment));

        tracing::debug!("created shared buffer '{}' ({} x {:?})", name, len, ty);
        Some(TypedView::full(segment))
    }

    /// Full view over an existing segment
    pub fn get_buffer(&self, name: &str) -> Option<TypedView> {
        self.buffers.get(name).map(|s| TypedView::full(Arc::clone(s)))
    }

    /// Differently-typed window over an existing segment
    ///
    /// `offset` and `len` are in elements of `ty`. The window must fit in
    /// the segment's byte range.
    pub fn add_view(
        &self,
        name: &str,
        ty: ElementType,
        offset: usize,
        len: usize,
    ) -> Result<TypedView> {
        let segment = self
            .buffers
            .get(name)
            .ok_or_else(|| SimError::BufferNotFound(name.to_string()))?;

        let width = ty.byte_width();
        let byte_offset = offset * width;
        let byte_len = len * width;
        if byte_offset + byte_len > segment.byte_len() {
            return Err(SimError::ViewOutOfRange {
                offset: byte_offset,
                len: byte_len,
                capacity: segment.byte_len(),
            });
        }

        Ok(TypedView {
            segment: Arc::clone(segment),
            ty,
            byte_offset,
            len,
        })
    }

    /// Drop a segment by name; outstanding views keep the bytes alive
    pub fn delete_buffer(&mut self, name: &str) -> bool {
        match self.buffers.remove(name) {
            Some(segment) => {
                self.allocated_bytes -= segment.byte_len();
                true
            }
            None => false,
        }
    }

    /// Interleaved per-entity component buffer: `[entity, component, 6
    /// values]` records, f32 throughout
    pub fn create_entity_buffer(
        &mut self,
        entity_count: usize,
        max_components: usize,
    ) -> Option<TypedView> {
        const COMPONENT_RECORD_SIZE: usize = 8;
        let len = entity_count * max_components * COMPONENT_RECORD_SIZE;
        self.create_buffer("entities", len, ElementType::F32)
    }
}

impl Default for SharedMemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_get_delete() {
        let mut mgr = SharedMemoryManager::with_budget(1024);
        assert!(mgr.is_available());

        let view = mgr.create_buffer("positions", 16, ElementType::F32).unwrap();
        assert_eq!(view.len(), 16);
        assert_eq!(view.element_type(), ElementType::F32);
        assert_eq!(mgr.allocated_bytes(), 64);

        assert!(mgr.get_buffer("positions").is_some());
        assert!(mgr.get_buffer("missing").is_none());

        assert!(mgr.delete_buffer("positions"));
        assert!(!mgr.delete_buffer("positions"));
        assert_eq!(mgr.allocated_bytes(), 0);
    }

    #[test]
    fn test_disabled_manager_refuses() {
        let mut mgr = SharedMemoryManager::disabled();
        assert!(!mgr.is_available());
        assert!(mgr.create_buffer("x", 4, ElementType::U8).is_none());
    }

    #[test]
    fn test_budget_exceeded_fails_gracefully() {
        let mut mgr = SharedMemoryManager::with_budget(32);
        assert!(mgr.create_buffer("small", 8, ElementType::F32).is_some());
        assert!(mgr.create_buffer("big", 9, ElementType::F32).is_none());

        // Freeing makes room again
        assert!(mgr.delete_buffer("small"));
        assert!(mgr.create_buffer("big", 8, ElementType::F32).is_some());
    }

    #[test]
    fn test_read_write_roundtrip() {
        let mut mgr = SharedMemoryManager::with_budget(1024);
        let view = mgr.create_buffer("buf", 8, ElementType::F32).unwrap();

        view.write(0, 1.5f32).unwrap();
        view.write(7, -2.25f32).unwrap();
        assert_eq!(view.read::<f32>(0).unwrap(), 1.5);
        assert_eq!(view.read::<f32>(7).unwrap(), -2.25);

        // A second view over the same segment sees the writes
        let alias = mgr.get_buffer("buf").unwrap();
        assert_eq!(alias.read::<f32>(0).unwrap(), 1.5);
    }

    #[test]
    fn test_slice_roundtrip() {
        let mut mgr = SharedMemoryManager::with_budget(1024);
        let view = mgr.create_buffer("buf", 8, ElementType::F32).unwrap();

        view.write_slice(2, &[10.0f32, 20.0, 30.0]).unwrap();
        let all = view.to_vec::<f32>().unwrap();
        assert_eq!(all, vec![0.0, 0.0, 10.0, 20.0, 30.0, 0.0, 0.0, 0.0]);

        let mut window = [0.0f32; 2];
        view.read_slice(3, &mut window).unwrap();
        assert_eq!(window, [20.0, 30.0]);
    }

    #[test]
    fn test_type_punning_view() {
        let mut mgr = SharedMemoryManager::with_budget(1024);
        let floats = mgr.create_buffer("pun", 4, ElementType::F32).unwrap();
        floats.write(0, 1.0f32).unwrap();

        let bits = mgr.add_view("pun", ElementType::U32, 0, 4).unwrap();
        assert_eq!(bits.read::<u32>(0).unwrap(), 0x3F80_0000);

        bits.write(1, 0x4000_0000u32).unwrap();
        assert_eq!(floats.read::<f32>(1).unwrap(), 2.0);
    }

    #[test]
    fn test_offset_view_window() {
        let mut mgr = SharedMemoryManager::with_budget(1024);
        let full = mgr.create_buffer("windowed", 8, ElementType::F32).unwrap();

        let tail = mgr.add_view("windowed", ElementType::F32, 4, 4).unwrap();
        tail.write(0, 9.0f32).unwrap();
        assert_eq!(full.read::<f32>(4).unwrap(), 9.0);

        // Window bounds are independent of the segment bounds
        assert!(tail.read::<f32>(4).is_err());
    }

    #[test]
    fn test_out_of_range_and_type_mismatch() {
        let mut mgr = SharedMemoryManager::with_budget(1024);
        let view = mgr.create_buffer("buf", 4, ElementType::F32).unwrap();

        assert!(matches!(
            view.read::<f32>(4),
            Err(SimError::ViewOutOfRange { .. })
        ));
        assert!(matches!(
            view.read::<u8>(0),
            Err(SimError::ElementTypeMismatch { .. })
        ));
        assert!(matches!(
            mgr.add_view("buf", ElementType::U32, 2, 4),
            Err(SimError::ViewOutOfRange { .. })
        ));
        assert!(matches!(
            mgr.add_view("missing", ElementType::U32, 0, 1),
            Err(SimError::BufferNotFound(_))
        ));
    }

    #[test]
    fn test_entity_buffer_layout() {
        let mut mgr = SharedMemoryManager::with_budget(1024 * 1024);
        let view = mgr.create_entity_buffer(100, 4).unwrap();
        assert_eq!(view.len(), 100 * 4 * 8);
        assert_eq!(view.element_type(), ElementType::F32);
        assert!(mgr.get_buffer("entities").is_some());
    }

    #[test]
    fn test_views_survive_delete() {
        let mut mgr = SharedMemoryManager::with_budget(1024);
        let view = mgr.create_buffer("orphan", 4, ElementType::F32).unwrap();
        view.write(0, 7.0f32).unwrap();

        mgr.delete_buffer("orphan");
        assert_eq!(view.read::<f32>(0).unwrap(), 7.0);
    }
}
