//! Human readable storage of template pyramids sharing a class label.
//!
//! A class is stored as one JSON document:
//!
//! ```json
//! {
//!   "class_label": "part",
//!   "num_of_template_pyramids": 1,
//!   "template_pyramids": [{
//!     "templates": [{
//!       "width": 34, "height": 34, "pyramid_level": 0, "num_of_features": 100,
//!       "features": [{ "x": 2, "y": 0, "angle_label": 4, "magnitude": 1040400 }],
//!       "kind": "plain"
//!     }]
//!   }]
//! }
//! ```
//!
//! Masked templates use `"kind": "masked"` and carry their mask in `additional_data`.

use crate::feature::Feature;
use crate::image::Size;
use crate::template::{Template, TemplateKind, TemplatePyramid};
use crate::{Error, Result};
use log::*;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TemplatePyramidClassRecord {
    class_label: String,
    num_of_template_pyramids: usize,
    template_pyramids: Vec<TemplatePyramidRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TemplatePyramidRecord {
    templates: Vec<TemplateRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TemplateRecord {
    width: i32,
    height: i32,
    pyramid_level: usize,
    num_of_features: usize,
    features: Vec<FeatureRecord>,
    #[serde(flatten)]
    kind: KindRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum KindRecord {
    Plain,
    Masked { additional_data: MaskRecord },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct MaskRecord {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct FeatureRecord {
    x: i32,
    y: i32,
    angle_label: u8,
    magnitude: i32,
}

impl TemplateRecord {
    fn from_template(template: &Template, pyramid_level: usize) -> Self {
        let kind = match template.kind() {
            TemplateKind::Plain => KindRecord::Plain,
            TemplateKind::Masked { mask } => KindRecord::Masked {
                additional_data: MaskRecord {
                    width: mask.ncols(),
                    height: mask.nrows(),
                    data: mask.iter().copied().collect(),
                },
            },
        };
        Self {
            width: template.size().width,
            height: template.size().height,
            pyramid_level,
            num_of_features: template.features().len(),
            features: template
                .features()
                .iter()
                .map(|f| FeatureRecord {
                    x: f.x,
                    y: f.y,
                    angle_label: f.angle_index(),
                    magnitude: f.magnitude,
                })
                .collect(),
            kind,
        }
    }

    fn into_template(self, class_label: &str) -> Result<Template> {
        let features = self
            .features
            .into_iter()
            .map(|f| Feature::new(f.x, f.y, f.angle_label, f.magnitude))
            .collect::<Result<Vec<_>>>()?;
        let template = Template::new(features, Size::new(self.width, self.height), class_label);
        Ok(match self.kind {
            KindRecord::Plain => template,
            KindRecord::Masked { additional_data } => template.with_mask(Array2::from_shape_vec(
                (additional_data.height, additional_data.width),
                additional_data.data,
            )?),
        })
    }
}

fn to_record(pyramids: &[TemplatePyramid]) -> Result<TemplatePyramidClassRecord> {
    let class_label = pyramids
        .iter()
        .find_map(TemplatePyramid::class_label)
        .ok_or(Error::EmptyClass)?;
    Ok(TemplatePyramidClassRecord {
        class_label: class_label.to_owned(),
        num_of_template_pyramids: pyramids.len(),
        template_pyramids: pyramids
            .iter()
            .map(|pyramid| TemplatePyramidRecord {
                templates: pyramid
                    .templates()
                    .iter()
                    .enumerate()
                    .map(|(level, template)| TemplateRecord::from_template(template, level))
                    .collect(),
            })
            .collect(),
    })
}

fn from_record(record: TemplatePyramidClassRecord) -> Result<Vec<TemplatePyramid>> {
    let class_label = record.class_label;
    let pyramids = record
        .template_pyramids
        .into_iter()
        .map(|pyramid| {
            let mut templates = pyramid.templates;
            templates.sort_by_key(|t| t.pyramid_level);
            templates
                .into_iter()
                .map(|t| t.into_template(&class_label))
                .collect::<Result<Vec<_>>>()
                .map(TemplatePyramid::new)
        })
        .collect::<Result<Vec<_>>>()?;
    debug!("Read {} template pyramids of class {:?}", pyramids.len(), class_label);
    Ok(pyramids)
}

/// Serializes pyramids of one class. The class label is taken from the first template.
pub fn to_string(pyramids: &[TemplatePyramid]) -> Result<String> {
    Ok(serde_json::to_string_pretty(&to_record(pyramids)?)?)
}

/// Parses pyramids written by [`to_string`] or [`save`].
pub fn from_str(json: &str) -> Result<Vec<TemplatePyramid>> {
    from_record(serde_json::from_str(json)?)
}

/// Writes pyramids of one class to a file.
pub fn save(pyramids: &[TemplatePyramid], path: impl AsRef<Path>) -> Result<()> {
    let record = to_record(pyramids)?;
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    serde_json::to_writer_pretty(&mut writer, &record)?;
    writer.flush()?;
    info!(
        "Saved {} template pyramids of class {:?} to {}",
        pyramids.len(),
        record.class_label,
        path.as_ref().display()
    );
    Ok(())
}

/// Reads pyramids of one class from a file.
pub fn load(path: impl AsRef<Path>) -> Result<Vec<TemplatePyramid>> {
    let reader = BufReader::new(File::open(path)?);
    from_record(serde_json::from_reader(reader)?)
}
