use crate::utils::compute_aligned_size;

use super::{SHADER_IDENTIFIER_SIZE, SHADER_RECORD_ALIGNMENT, SHADER_TABLE_ALIGNMENT};

/// Argument written into a shader table record right after the identifier.
/// Root descriptors and descriptor table starts are both 8 bytes on the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalArg {
    None,
    /// GPU virtual address of a constant buffer, bound as a local root CBV.
    /// The index selects from the address list given to the table writer.
    ConstantBuffer(usize),
    /// GPU handle of the given slot in the shared shader-visible heap, bound
    /// as the start of a local descriptor table.
    HeapTable(u32),
}

impl LocalArg {
    fn size(&self) -> u64 {
        match self {
            LocalArg::None => 0,
            LocalArg::ConstantBuffer(_) | LocalArg::HeapTable(_) => 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShaderRecord {
    pub export: String,
    pub arg: LocalArg,
}

impl ShaderRecord {
    fn new(export: &str, arg: LocalArg) -> Self {
        Self {
            export: export.to_string(),
            arg,
        }
    }
}

/// Describes every record of a shader table before any GPU resource exists:
/// which exports go where, what local argument each record carries, and which
/// contiguous run of hit records belongs to which TLAS instance.
///
/// Offsets, strides and instance contributions all derive from this one
/// description, so the table writer, the instance writer and DispatchRays can
/// never disagree about where a record lives.
#[derive(Debug, Default)]
pub struct TableLayout {
    raygen: Vec<ShaderRecord>,
    miss: Vec<ShaderRecord>,
    instances: Vec<Vec<ShaderRecord>>,
}

impl TableLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_raygen(&mut self, export: &str, arg: LocalArg) {
        self.raygen.push(ShaderRecord::new(export, arg));
    }

    /// Miss records get ray-type indices in registration order: the first
    /// registered miss shader is miss index 0.
    pub fn add_miss(&mut self, export: &str, arg: LocalArg) {
        self.miss.push(ShaderRecord::new(export, arg));
    }

    /// Registers a TLAS instance and returns its index. Hit records are added
    /// per instance, in hit-group-index order (geometry-major, then ray type).
    pub fn add_instance(&mut self) -> usize {
        self.instances.push(Vec::new());
        self.instances.len() - 1
    }

    pub fn add_hit_record(&mut self, instance: usize, export: &str, arg: LocalArg) {
        assert!(
            instance < self.instances.len(),
            "unknown instance index {}",
            instance
        );
        self.instances[instance].push(ShaderRecord::new(export, arg));
    }

    /// One stride for every record in the table: the largest record, aligned.
    pub fn record_stride(&self) -> u64 {
        let largest_arg = self
            .records()
            .map(|record| record.arg.size())
            .max()
            .unwrap_or(0);

        compute_aligned_size(SHADER_IDENTIFIER_SIZE + largest_arg, SHADER_RECORD_ALIGNMENT)
    }

    pub fn record_count(&self) -> usize {
        self.raygen.len() + self.miss.len() + self.hit_record_count()
    }

    fn hit_record_count(&self) -> usize {
        self.instances.iter().map(Vec::len).sum()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Value for InstanceContributionToHitGroupIndex: the number of hit
    /// records belonging to instances before this one.
    pub fn instance_contribution(&self, instance: usize) -> u32 {
        assert!(
            instance < self.instances.len(),
            "unknown instance index {}",
            instance
        );
        self.instances[..instance]
            .iter()
            .map(Vec::len)
            .sum::<usize>() as u32
    }

    /// Position of the instance's first hit record in the whole table,
    /// counting from the ray generation record.
    pub fn hit_record_index(&self, instance: usize) -> usize {
        self.raygen.len() + self.miss.len() + self.instance_contribution(instance) as usize
    }

    pub fn raygen_offset(&self) -> u64 {
        0
    }

    fn raygen_size(&self) -> u64 {
        self.raygen.len() as u64 * self.record_stride()
    }

    pub fn miss_offset(&self) -> u64 {
        compute_aligned_size(self.raygen_size(), SHADER_TABLE_ALIGNMENT)
    }

    fn miss_size(&self) -> u64 {
        self.miss.len() as u64 * self.record_stride()
    }

    pub fn hit_offset(&self) -> u64 {
        compute_aligned_size(self.miss_offset() + self.miss_size(), SHADER_TABLE_ALIGNMENT)
    }

    fn hit_size(&self) -> u64 {
        self.hit_record_count() as u64 * self.record_stride()
    }

    pub fn total_size(&self) -> u64 {
        self.hit_offset() + self.hit_size()
    }

    /// Every record paired with its byte offset in the table, in table order.
    pub fn records_with_offsets(&self) -> Vec<(u64, &ShaderRecord)> {
        let stride = self.record_stride();
        let mut placed = Vec::with_capacity(self.record_count());

        for (i, record) in self.raygen.iter().enumerate() {
            placed.push((self.raygen_offset() + i as u64 * stride, record));
        }
        for (i, record) in self.miss.iter().enumerate() {
            placed.push((self.miss_offset() + i as u64 * stride, record));
        }
        for (i, record) in self.instances.iter().flatten().enumerate() {
            placed.push((self.hit_offset() + i as u64 * stride, record));
        }

        placed
    }

    fn records(&self) -> impl Iterator<Item = &ShaderRecord> {
        self.raygen
            .iter()
            .chain(self.miss.iter())
            .chain(self.instances.iter().flatten())
    }

    /// The three DispatchRays regions. Empty sections come out zeroed instead
    /// of pointing at whatever follows them in the buffer.
    pub fn dispatch_regions(&self) -> DispatchRegions {
        let stride = self.record_stride();

        let mut regions = DispatchRegions::default();
        if !self.raygen.is_empty() {
            regions.raygen_offset = self.raygen_offset();
            // DispatchRays wants the ray generation record size, not a stride.
            regions.raygen_size = stride;
        }
        if !self.miss.is_empty() {
            regions.miss_offset = self.miss_offset();
            regions.miss_size = self.miss_size();
            regions.miss_stride = stride;
        }
        if self.hit_record_count() > 0 {
            regions.hit_offset = self.hit_offset();
            regions.hit_size = self.hit_size();
            regions.hit_stride = stride;
        }

        regions
    }
}

/// Byte ranges of the three table sections, relative to the table buffer
/// start. Feed these plus the buffer base address into a dispatch desc.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchRegions {
    pub raygen_offset: u64,
    pub raygen_size: u64,
    pub miss_offset: u64,
    pub miss_size: u64,
    pub miss_stride: u64,
    pub hit_offset: u64,
    pub hit_size: u64,
    pub hit_stride: u64,
}

#[cfg(test)]
fn tutorial_layout() -> TableLayout {
    let mut layout = TableLayout::new();
    layout.add_raygen("rayGen", LocalArg::HeapTable(0));
    layout.add_miss("miss", LocalArg::None);
    layout.add_miss("shadowMiss", LocalArg::None);

    let plane_and_triangle = layout.add_instance();
    layout.add_hit_record(plane_and_triangle, "TriHitGroup", LocalArg::ConstantBuffer(0));
    layout.add_hit_record(plane_and_triangle, "ShadowHitGroup", LocalArg::None);
    layout.add_hit_record(plane_and_triangle, "PlaneHitGroup", LocalArg::HeapTable(1));
    layout.add_hit_record(plane_and_triangle, "ShadowHitGroup", LocalArg::None);

    for i in 1..3 {
        let triangle = layout.add_instance();
        layout.add_hit_record(triangle, "TriHitGroup", LocalArg::ConstantBuffer(i));
        layout.add_hit_record(triangle, "ShadowHitGroup", LocalArg::None);
    }

    layout
}

#[test]
fn test_record_stride() {
    let mut layout = TableLayout::new();
    layout.add_raygen("rayGen", LocalArg::None);
    assert_eq!(layout.record_stride(), 32);

    layout.add_miss("miss", LocalArg::HeapTable(0));
    assert_eq!(layout.record_stride(), 64);

    assert_eq!(tutorial_layout().record_stride(), 64);
}

#[test]
fn test_tutorial_table_shape() {
    let layout = tutorial_layout();

    assert_eq!(layout.record_count(), 11);
    assert_eq!(layout.instance_count(), 3);
    assert_eq!(layout.total_size(), 704);

    assert_eq!(layout.instance_contribution(0), 0);
    assert_eq!(layout.instance_contribution(1), 4);
    assert_eq!(layout.instance_contribution(2), 6);

    assert_eq!(layout.hit_record_index(0), 3);
    assert_eq!(layout.hit_record_index(1), 7);
    assert_eq!(layout.hit_record_index(2), 9);
}

#[test]
fn test_tutorial_regions() {
    let regions = tutorial_layout().dispatch_regions();

    assert_eq!(regions.raygen_offset, 0);
    assert_eq!(regions.raygen_size, 64);
    assert_eq!(regions.miss_offset, 64);
    assert_eq!(regions.miss_size, 128);
    assert_eq!(regions.miss_stride, 64);
    assert_eq!(regions.hit_offset, 192);
    assert_eq!(regions.hit_size, 512);
    assert_eq!(regions.hit_stride, 64);
}

#[test]
fn test_record_offsets() {
    let layout = tutorial_layout();
    let placed = layout.records_with_offsets();

    assert_eq!(placed.len(), 11);
    for (i, (offset, _)) in placed.iter().enumerate() {
        assert_eq!(*offset, i as u64 * 64);
    }
    assert_eq!(placed[3].1.export, "TriHitGroup");
    assert_eq!(placed[5].1.export, "PlaneHitGroup");
    assert_eq!(placed[9].1.export, "TriHitGroup");
}

#[test]
fn test_empty_sections_zeroed() {
    let mut layout = TableLayout::new();
    layout.add_raygen("rayGen", LocalArg::None);

    let regions = layout.dispatch_regions();
    assert_eq!(regions.raygen_size, 32);
    assert_eq!(regions.miss_offset, 0);
    assert_eq!(regions.miss_size, 0);
    assert_eq!(regions.miss_stride, 0);
    assert_eq!(regions.hit_stride, 0);
}
