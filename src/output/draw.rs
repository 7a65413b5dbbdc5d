// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use tracing::{debug, info, warn};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;

pub const ALARM_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const NORMAL_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// 未指定字体时依次尝试的系统字体
const SYSTEM_FONTS: [&str; 5] = [
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
  "/System/Library/Fonts/Supplemental/Arial.ttf",
];

fn load_font(path: &Path) -> Option<FontArc> {
  let data = std::fs::read(path).ok()?;
  match FontArc::try_from_vec(data) {
    Ok(font) => Some(font),
    Err(_) => {
      warn!("字体文件无效: {}", path.display());
      None
    }
  }
}

/// 检测框绘制器
///
/// 告警类别画红框，其余画绿框；标签为 `类别:分数`。
/// 没有可用字体时只画框。
pub struct Draw {
  font: Option<FontArc>,
  scale: PxScale,
}

impl Draw {
  pub fn new(font_file: Option<&Path>) -> Self {
    let font = font_file
      .and_then(load_font)
      .or_else(|| SYSTEM_FONTS.iter().map(Path::new).find_map(load_font));

    match &font {
      Some(_) => debug!("标签字体已加载"),
      None => info!("没有可用字体，只绘制检测框"),
    }

    Self {
      font,
      scale: PxScale::from(LABEL_FONT_SIZE),
    }
  }

  pub fn without_font() -> Self {
    Self {
      font: None,
      scale: PxScale::from(LABEL_FONT_SIZE),
    }
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  /// `bbox` 为原始帧像素坐标 [x_min, y_min, x_max, y_max]
  pub fn draw_detection(
    &self,
    image: &mut RgbImage,
    bbox: &[f32; 4],
    class_name: &str,
    score: f32,
    alarm: bool,
  ) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let x_min = (bbox[0] as i32).clamp(0, w - 1);
    let y_min = (bbox[1] as i32).clamp(0, h - 1);
    let x_max = (bbox[2] as i32).clamp(0, w - 1);
    let y_max = (bbox[3] as i32).clamp(0, h - 1);
    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let color = if alarm { ALARM_COLOR } else { NORMAL_COLOR };
    for t in 0..BOX_THICKNESS {
      let (bw, bh) = (x_max - x_min - 2 * t + 1, y_max - y_min - 2 * t + 1);
      if bw <= 0 || bh <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(bw as u32, bh as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let Some(font) = &self.font else {
      return;
    };

    let label = format!("{}:{:.2}", class_name, score);
    let (text_w, text_h) = text_size(self.scale, font, &label);
    let label_h = text_h as i32 + 2 * LABEL_TEXT_VERTICAL_PADDING;
    // 标签放在框的上方，空间不够时贴着图像顶部
    let label_x = x_min;
    let label_y = (y_min - label_h).max(0);
    let label_w = (text_w as i32).min(w - label_x);

    if label_w > 0 && label_h > 0 {
      let rect = Rect::at(label_x, label_y).of_size(label_w as u32, label_h as u32);
      draw_filled_rect_mut(image, rect, color);
      draw_text_mut(
        image,
        TEXT_COLOR,
        label_x,
        label_y + LABEL_TEXT_VERTICAL_PADDING,
        self.scale,
        font,
        &label,
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn alarm_boxes_are_red_and_others_green() {
    let draw = Draw::without_font();
    let mut image = RgbImage::new(64, 48);
    draw.draw_detection(&mut image, &[4.0, 4.0, 20.0, 20.0], "head", 0.9, true);
    draw.draw_detection(&mut image, &[30.0, 10.0, 50.0, 40.0], "helmet", 0.8, false);

    assert_eq!(*image.get_pixel(4, 4), ALARM_COLOR);
    assert_eq!(*image.get_pixel(5, 12), ALARM_COLOR);
    assert_eq!(*image.get_pixel(12, 12), Rgb([0, 0, 0]));
    assert_eq!(*image.get_pixel(50, 40), NORMAL_COLOR);
  }

  #[test]
  fn boxes_outside_the_frame_are_clamped() {
    let draw = Draw::without_font();
    let mut image = RgbImage::new(16, 16);
    draw.draw_detection(&mut image, &[-10.0, -10.0, 100.0, 100.0], "vest", 0.5, false);
    assert_eq!(*image.get_pixel(0, 0), NORMAL_COLOR);
    assert_eq!(*image.get_pixel(15, 15), NORMAL_COLOR);

    // 退化框什么都不画
    let mut blank = RgbImage::new(16, 16);
    draw.draw_detection(&mut blank, &[5.0, 5.0, 5.0, 9.0], "vest", 0.5, false);
    assert!(blank.pixels().all(|p| *p == Rgb([0, 0, 0])));
  }
}
