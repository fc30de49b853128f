use image::{DynamicImage, GrayImage, Luma};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect as DrawRect;
use line2d::image::{Image, Rect};
use line2d::template::ExtractedFeatures;
use line2d::{
    LinearizedMapPyramid, LinearizedMaps, MapsConfig, MatchClustering, Template, TemplateConfig,
    TemplatePyramid,
};
use log::*;

const SQUARE: u32 = 32;

fn init_logger() {
    let _ = pretty_env_logger::formatted_builder()
        .is_test(true)
        .filter_level(LevelFilter::Debug)
        .try_init();
}

/// A black image with a white rectangle.
fn rectangle_image(width: u32, height: u32, x: i32, y: i32, w: u32, h: u32) -> Image<u8> {
    let mut image = GrayImage::new(width, height);
    draw_filled_rect_mut(&mut image, DrawRect::at(x, y).of_size(w, h), Luma([255u8]));
    Image::from_dynamic(&DynamicImage::ImageLuma8(image))
}

fn template_image() -> Image<u8> {
    rectangle_image(64, 64, 16, 16, SQUARE, SQUARE)
}

/// Origin of the template bounding box inside the template image.
fn template_origin(image: &Image<u8>, max_features: usize) -> (i32, i32) {
    let extracted = ExtractedFeatures::from_image(image.view(), 40, 4, max_features).unwrap();
    (extracted.bounding_rect.x, extracted.bounding_rect.y)
}

#[test]
fn finds_itself() {
    init_logger();
    let template = Template::from_image(template_image().view(), 40, 4, 100, "square").unwrap();
    let (origin_x, origin_y) = template_origin(&template_image(), 100);
    let scene = rectangle_image(160, 120, 16 + 53, 16 + 27, SQUARE, SQUARE);
    let maps = LinearizedMaps::from_image(scene.view(), 35, 5, 4).unwrap();

    let matches = maps.match_template(&template, 85.0);
    info!("{} matches", matches.len());
    let (expected_x, expected_y) = (53 + origin_x, 27 + origin_y);
    assert!(
        matches.iter().any(|m| m.score >= 99.9
            && (m.x - expected_x).abs() <= 2
            && (m.y - expected_y).abs() <= 2),
        "no match near ({}, {}) in {:?}",
        expected_x,
        expected_y,
        matches
    );
    assert!(matches.iter().all(|m| m.score >= 85.0 && m.score <= 100.0));
    assert!(matches.iter().all(|m| m.template == &template));

    // Matching is a pure function of its inputs.
    assert_eq!(maps.match_template(&template, 85.0), matches);
}

#[test]
fn search_area_restricts_matches() {
    init_logger();
    let template = Template::from_image(template_image().view(), 40, 4, 100, "square").unwrap();
    let scene = rectangle_image(160, 120, 16 + 53, 16 + 27, SQUARE, SQUARE);
    let maps = LinearizedMaps::from_image(scene.view(), 35, 5, 4).unwrap();

    let area = Rect::new(0, 0, 50, 120);
    let matches = maps.match_template_in(&template, area, 85.0).unwrap();
    assert!(matches.is_empty());
    let everywhere = maps
        .match_template_in(&template, Rect::new(0, 0, 160, 120), 85.0)
        .unwrap();
    assert_eq!(everywhere, maps.match_template(&template, 85.0));
}

#[test]
fn finds_itself_coarse_to_fine() {
    init_logger();
    let image = template_image();
    let coarse = image.view().pyr_down();
    let (origin_x, origin_y) = template_origin(&image, 100);
    let (coarse_x, coarse_y) = template_origin(&coarse, 50);

    // Place the square so the coarse template origin sits in the middle of a block.
    let offset = |origin: i32| (20..).find(|o| (o + origin) % 5 == 2).unwrap_or(20);
    let (offset_x, offset_y) = (2 * offset(coarse_x), 2 * offset(coarse_y));
    let scene = rectangle_image(160, 120, 16 + offset_x, 16 + offset_y, SQUARE, SQUARE);

    let pyramid = TemplatePyramid::from_image(image.view(), "square", &TemplateConfig::new(vec![100, 50]))
        .unwrap()
        .unwrap();
    let maps = LinearizedMapPyramid::from_image(scene.view(), &MapsConfig::new(vec![5, 5])).unwrap();
    let matches = maps.match_template(&pyramid, 85.0).unwrap();

    let (expected_x, expected_y) = (offset_x + origin_x, offset_y + origin_y);
    assert!(
        matches.iter().any(|m| m.score >= 99.9
            && (m.x - expected_x).abs() <= 2
            && (m.y - expected_y).abs() <= 2),
        "no match near ({}, {}) in {:?}",
        expected_x,
        expected_y,
        matches
    );
    assert!(matches
        .iter()
        .all(|m| std::ptr::eq(m.template, &pyramid.templates()[0])));
}

#[test]
fn objects_cut_by_the_border() {
    init_logger();
    let config = TemplateConfig::new(vec![100, 50]);
    let pyramid = TemplatePyramid::from_image(template_image().view(), "square", &config)
        .unwrap()
        .unwrap();
    let maps_config = MapsConfig::new(vec![5, 5]);
    for (x, y) in [(40, 101), (140, 40), (130, 90), (0, 0), (150, 110)] {
        let scene = rectangle_image(160, 120, x, y, SQUARE, SQUARE);
        let maps = LinearizedMapPyramid::from_image(scene.view(), &maps_config).unwrap();
        let matches = maps.match_template(&pyramid, 60.0).unwrap();
        debug!("{} matches with the square at ({}, {})", matches.len(), x, y);
        assert!(matches.iter().all(|m| m.score >= 60.0 && m.score <= 100.0));
    }
}

#[test]
fn scene_smaller_than_neighborhood() {
    init_logger();
    let config = TemplateConfig {
        min_number_of_features: 10,
        ..TemplateConfig::new(vec![100, 50, 20])
    };
    let pyramid = TemplatePyramid::from_image(template_image().view(), "square", &config)
        .unwrap()
        .unwrap();
    assert_eq!(pyramid.levels(), 3);
    for (width, height) in [(4, 4), (16, 16), (64, 9)] {
        let scene = rectangle_image(width, height, 1, 1, 2, 2);
        let maps =
            LinearizedMapPyramid::from_image(scene.view(), &MapsConfig::new(vec![5, 5, 5])).unwrap();
        assert!(maps.match_template(&pyramid, 0.0).unwrap().is_empty());
    }
}

#[test]
fn template_larger_than_scene() {
    init_logger();
    let template = Template::from_image(template_image().view(), 40, 4, 100, "square").unwrap();
    let scene = rectangle_image(30, 30, 4, 4, 20, 20);
    let maps = LinearizedMaps::from_image(scene.view(), 35, 5, 4).unwrap();
    assert!(maps.match_template(&template, 0.0).is_empty());
}

#[test]
fn many_templates_keep_order() {
    init_logger();
    let square = Template::from_image(template_image().view(), 40, 4, 100, "square").unwrap();
    let bar = Template::from_image(
        rectangle_image(64, 64, 8, 24, 48, 16).view(),
        40,
        4,
        100,
        "bar",
    )
    .unwrap();
    let templates = vec![square, bar];

    let mut scene = GrayImage::new(200, 120);
    draw_filled_rect_mut(&mut scene, DrawRect::at(30, 30).of_size(SQUARE, SQUARE), Luma([255u8]));
    draw_filled_rect_mut(&mut scene, DrawRect::at(110, 70).of_size(48, 16), Luma([255u8]));
    let scene = Image::from_dynamic(&DynamicImage::ImageLuma8(scene));
    let maps = LinearizedMaps::from_image(scene.view(), 35, 5, 4).unwrap();

    let matches = maps.match_templates(&templates, 85.0);
    let expected = templates
        .iter()
        .flat_map(|t| maps.match_template(t, 85.0))
        .collect::<Vec<_>>();
    assert_eq!(matches, expected);
    assert!(matches.iter().any(|m| m.template.class_label() == "square"));
    assert!(matches.iter().any(|m| m.template.class_label() == "bar"));
}

#[test]
fn clustering_groups_neighbors() {
    init_logger();
    let template = Template::from_image(template_image().view(), 40, 4, 100, "square").unwrap();
    let mut scene = GrayImage::new(240, 120);
    draw_filled_rect_mut(&mut scene, DrawRect::at(30, 30).of_size(SQUARE, SQUARE), Luma([255u8]));
    draw_filled_rect_mut(&mut scene, DrawRect::at(160, 50).of_size(SQUARE, SQUARE), Luma([255u8]));
    let scene = Image::from_dynamic(&DynamicImage::ImageLuma8(scene));
    let maps = LinearizedMaps::from_image(scene.view(), 35, 5, 4).unwrap();

    let matches = maps.match_template(&template, 80.0);
    let groups = MatchClustering::default().group(&matches);
    assert_eq!(groups.len(), 2);
    assert_eq!(groups.iter().map(|g| g.len()).sum::<usize>(), matches.len());
    for group in &groups {
        assert!(group.matches.iter().all(|m| m.score <= group.representative.score));
    }
    assert!(groups[0].rect.x < groups[1].rect.x);
}

#[cfg(feature = "serde")]
#[test]
fn saved_pyramids_match_the_same() {
    init_logger();
    let config = TemplateConfig::new(vec![100, 50]);
    let pyramids = vec![
        TemplatePyramid::from_image(template_image().view(), "square", &config)
            .unwrap()
            .unwrap(),
        TemplatePyramid::from_image_with_mask(template_image().view(), "square", &config)
            .unwrap()
            .unwrap(),
    ];
    let path = std::env::temp_dir().join(format!("line2d-square-{}.json", std::process::id()));
    line2d::serialization::save(&pyramids, &path).unwrap();
    let loaded = line2d::serialization::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(loaded, pyramids);

    let scene = rectangle_image(160, 120, 60, 40, SQUARE, SQUARE);
    let maps = LinearizedMapPyramid::from_image(scene.view(), &MapsConfig::new(vec![5, 5])).unwrap();
    let scores = |pyramids: &[TemplatePyramid]| {
        maps.match_templates(pyramids, 85.0)
            .unwrap()
            .iter()
            .map(|m| (m.x, m.y, m.score))
            .collect::<Vec<_>>()
    };
    assert_eq!(scores(&loaded), scores(&pyramids));
}
