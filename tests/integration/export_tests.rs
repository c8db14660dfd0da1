//! End-to-end export tests: volume in, multipage TIFF out.

use std::sync::Arc;

use tiff_stack_export::format::tiff::Photometric;
use tiff_stack_export::{
    ExportError, ExportOptions, FileRangeReader, FixedMemory, Page, PageIndex, RawVolumeSource,
    SampleType, StackExporter, TaggedShape, VolumeMetadata,
};

use super::test_utils::{
    raw_u16_volume, record_progress, u16_samples, MemoryReader, SyntheticVolume,
};

const GIB: u64 = 1 << 30;

async fn read_pages(path: &std::path::Path) -> (FileRangeReader, PageIndex) {
    let reader = FileRangeReader::open(path).await.unwrap();
    let index = PageIndex::read(&reader).await.unwrap();
    (reader, index)
}

#[tokio::test]
async fn test_zcyx_stack_exports_ten_pages_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stack.tif");

    let volume = Arc::new(
        SyntheticVolume::new(&[("z", 10), ("c", 1), ("y", 20), ("x", 30)]).reverse_completion(2),
    );
    let exporter = StackExporter::new(Arc::clone(&volume), ExportOptions::default()).unwrap();
    assert_eq!(exporter.axes().step_axis(), "z");
    assert_eq!(exporter.axes().channel_axis(), None);

    let progress = record_progress(exporter.progress());
    let summary = exporter.export_to(&path, &FixedMemory(GIB)).await.unwrap();
    assert_eq!(summary.pages, 10);

    let (reader, index) = read_pages(&path).await;
    assert_eq!(index.len(), 10);
    for (i, page) in index.pages().iter().enumerate() {
        assert_eq!((page.width, page.height), (30, 20));
        assert_eq!(page.samples_per_pixel, 1);
        assert_eq!(page.sample_type(), Some(SampleType::U16));
        assert_eq!(page.compression, 1);

        let data = index.read_page_data(&reader, i).await.unwrap();
        assert_eq!(u16_samples(&data), volume.slice_values(i), "page {}", i);
    }

    let progress = progress.lock().unwrap().clone();
    assert_eq!(progress.first(), Some(&0));
    assert_eq!(progress.last(), Some(&100));
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_failure_at_index_three_leaves_three_pages() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.tif");

    let volume = Arc::new(
        SyntheticVolume::new(&[("z", 10), ("c", 1), ("y", 20), ("x", 30)]).failing_at(3),
    );
    let exporter = StackExporter::new(Arc::clone(&volume), ExportOptions::default()).unwrap();
    let progress = record_progress(exporter.progress());

    let err = exporter
        .export_to(&path, &FixedMemory(GIB))
        .await
        .unwrap_err();
    assert!(
        matches!(err, ExportError::SourceFetch { index: 3, .. }),
        "unexpected error: {err:?}"
    );
    assert!(err.to_string().contains("slice 3"));

    let (reader, index) = read_pages(&path).await;
    assert_eq!(index.len(), 3);
    for i in 0..3 {
        let data = index.read_page_data(&reader, i).await.unwrap();
        assert_eq!(u16_samples(&data), volume.slice_values(i));
    }

    assert_ne!(progress.lock().unwrap().last(), Some(&100));
}

#[tokio::test]
async fn test_existing_output_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stack.tif");

    let first = Arc::new(SyntheticVolume::new(&[("z", 5), ("y", 4), ("x", 4)]));
    StackExporter::new(first, ExportOptions::default())
        .unwrap()
        .export_to(&path, &FixedMemory(GIB))
        .await
        .unwrap();

    let second = Arc::new(SyntheticVolume::new(&[("z", 2), ("y", 3), ("x", 3)]));
    StackExporter::new(second, ExportOptions::default())
        .unwrap()
        .export_to(&path, &FixedMemory(GIB))
        .await
        .unwrap();

    let (_, index) = read_pages(&path).await;
    assert_eq!(index.len(), 2);
    assert_eq!(index.pages()[0].width, 3);
}

#[tokio::test]
async fn test_invalid_shape_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keep.tif");
    std::fs::write(&path, b"previous contents").unwrap();

    let volume = Arc::new(SyntheticVolume::new(&[("t", 2), ("z", 3), ("y", 4), ("x", 5)]));
    let result = StackExporter::new(Arc::clone(&volume), ExportOptions::default());

    assert!(matches!(result, Err(ExportError::InvalidShape { .. })));
    assert_eq!(volume.fetch_count(), 0);
    assert_eq!(std::fs::read(&path).unwrap(), b"previous contents");
}

#[tokio::test]
async fn test_channel_axis_becomes_rgb_samples() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rgb.tif");

    let volume = Arc::new(SyntheticVolume::new(&[("z", 3), ("y", 4), ("x", 5), ("c", 3)]));
    let exporter = StackExporter::new(Arc::clone(&volume), ExportOptions::default()).unwrap();
    assert_eq!(exporter.axes().channel_axis(), Some("c"));
    exporter.export_to(&path, &FixedMemory(GIB)).await.unwrap();

    let (reader, index) = read_pages(&path).await;
    assert_eq!(index.len(), 3);
    let page = &index.pages()[1];
    assert_eq!((page.width, page.height, page.samples_per_pixel), (5, 4, 3));
    assert_eq!(page.bits_per_sample, vec![16, 16, 16]);
    assert_eq!(page.photometric, Some(Photometric::Rgb as u16));

    // Trailing channel is already interleaved
    let data = index.read_page_data(&reader, 1).await.unwrap();
    assert_eq!(u16_samples(&data), volume.slice_values(1));
}

#[tokio::test]
async fn test_planar_channel_is_interleaved_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("planar.tif");

    let volume = Arc::new(SyntheticVolume::new(&[("z", 2), ("c", 2), ("y", 3), ("x", 4)]));
    StackExporter::new(Arc::clone(&volume), ExportOptions::default())
        .unwrap()
        .export_to(&path, &FixedMemory(GIB))
        .await
        .unwrap();

    let (reader, index) = read_pages(&path).await;
    let page = &index.pages()[1];
    assert_eq!((page.width, page.height, page.samples_per_pixel), (4, 3, 2));
    assert_eq!(page.photometric, Some(Photometric::MinIsBlack as u16));

    // slice 1 holds flat indices 24..48 as (c, y, x); pages store (y, x, c)
    let planar = volume.slice_values(1);
    let mut expected = Vec::new();
    for yx in 0..12 {
        expected.push(planar[yx]);
        expected.push(planar[12 + yx]);
    }
    let data = index.read_page_data(&reader, 1).await.unwrap();
    assert_eq!(u16_samples(&data), expected);
}

#[tokio::test]
async fn test_raw_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let raw_path = dir.path().join("volume.raw");
    let tif_path = dir.path().join("volume.tif");

    // 16-byte header before the samples
    let mut raw = vec![0xAB; 16];
    raw.extend(raw_u16_volume(4 * 6 * 7));
    std::fs::write(&raw_path, &raw).unwrap();

    let shape: TaggedShape = "t=1,z=4,y=6,x=7".parse().unwrap();
    let reader = FileRangeReader::open(&raw_path).await.unwrap();
    let source =
        RawVolumeSource::new(reader, VolumeMetadata::new(shape, SampleType::U16), 16).unwrap();

    let summary = StackExporter::new(Arc::new(source), ExportOptions::default())
        .unwrap()
        .export_to(&tif_path, &FixedMemory(GIB))
        .await
        .unwrap();
    assert_eq!(summary.pages, 4);

    let (reader, index) = read_pages(&tif_path).await;
    for i in 0..4 {
        let data = index.read_page_data(&reader, i).await.unwrap();
        let expected: Vec<u16> = (i * 42..(i + 1) * 42).map(|v| v as u16).collect();
        assert_eq!(u16_samples(&data), expected);
    }
}

#[tokio::test]
async fn test_raw_source_reads_one_run_per_slice() {
    let shape: TaggedShape = "z=5,y=8,x=8".parse().unwrap();
    let reader = MemoryReader::new(raw_u16_volume(5 * 64), "mem://volume");
    let metadata = VolumeMetadata::new(shape, SampleType::U16);
    let source = Arc::new(RawVolumeSource::new(reader, metadata, 0).unwrap());

    let mut pages: Vec<Page> = Vec::new();
    StackExporter::new(Arc::clone(&source), ExportOptions::default())
        .unwrap()
        .export_with(&mut pages, &FixedMemory(GIB))
        .await
        .unwrap();

    assert_eq!(pages.len(), 5);
    assert_eq!(source.reader().request_count(), 5);
}
