// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::address::{DeviceInfo, InfoAllow};
use crate::context::XmlFlags;
use crate::enums::{parse_enum, VideoType, VirtType};
use crate::error::{Error, Result};
use crate::xml::{Element, Tag, XmlWriter};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoAccel {
    pub accel3d: bool,
    pub accel2d: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoDef {
    pub kind: VideoType,
    /// KiB.
    pub vram: u32,
    pub heads: u32,
    pub accel: Option<VideoAccel>,
    pub info: DeviceInfo,
}

/// The adapter a guest gets when its configuration does not name one.
pub fn default_video_type(virt: VirtType, os_type: &str) -> Option<VideoType> {
    match virt {
        VirtType::Test
        | VirtType::Qemu
        | VirtType::Kqemu
        | VirtType::Kvm
        | VirtType::Xen => {
            if os_type == "xen" || os_type == "linux" {
                Some(VideoType::Xen)
            } else {
                Some(VideoType::Cirrus)
            }
        }
        VirtType::Vbox => Some(VideoType::Vbox),
        VirtType::Vmware => Some(VideoType::Vmvga),
        _ => None,
    }
}

/// Video memory in KiB given to an adapter without an explicit `vram`.
pub fn default_vram(kind: VideoType, virt: VirtType) -> u32 {
    match kind {
        VideoType::Vga | VideoType::Cirrus | VideoType::Vmvga => match virt {
            VirtType::Vbox => 8 * 1024,
            VirtType::Vmware => 4 * 1024,
            _ => 9 * 1024,
        },
        // The original Xen PV framebuffer is hardcoded to 4 MiB.
        VideoType::Xen => 4 * 1024,
        VideoType::Qxl => 64 * 1024,
        VideoType::Vbox => 8 * 1024,
    }
}

impl VideoDef {
    pub fn new_default(kind: VideoType, virt: VirtType) -> Self {
        Self {
            kind,
            vram: default_vram(kind, virt),
            heads: 1,
            accel: None,
            info: DeviceInfo::default(),
        }
    }

    pub fn parse(
        node: &Element,
        flags: XmlFlags,
        virt: VirtType,
        os_type: &str,
    ) -> Result<Self> {
        let model = node.child("model");

        let kind = match model.and_then(|m| m.attr("type")) {
            Some(t) => parse_enum(t)?,
            None => default_video_type(virt, os_type).ok_or_else(|| {
                Error::ConfigUnsupported(
                    "missing video model and cannot determine default"
                        .to_string(),
                )
            })?,
        };

        let vram = match model {
            Some(m) => m.attr_parse::<u32>("vram")?,
            None => None,
        };
        let heads = match model {
            Some(m) => m.attr_parse::<u32>("heads")?,
            None => None,
        };

        let accel = match model.and_then(|m| m.child("acceleration")) {
            Some(a) => Some(VideoAccel {
                accel3d: a.attr_yes_no("accel3d")?.unwrap_or(false),
                accel2d: a.attr_yes_no("accel2d")?.unwrap_or(false),
            }),
            None => None,
        };

        Ok(VideoDef {
            kind,
            vram: vram.unwrap_or_else(|| default_vram(kind, virt)),
            heads: heads.unwrap_or(1),
            accel,
            info: DeviceInfo::parse(node, flags, InfoAllow::empty())?,
        })
    }

    pub fn format(&self, w: &mut XmlWriter, flags: XmlFlags) -> Result<()> {
        w.open(Tag::new("video"));
        let model = Tag::new("model")
            .attr("type", self.kind)
            .attr_if(self.vram > 0, "vram", self.vram)
            .attr_if(self.heads > 0, "heads", self.heads);
        let mut inner = w.nested();
        if let Some(a) = &self.accel {
            let yes_no = |b: bool| if b { "yes" } else { "no" };
            inner.empty(
                Tag::new("acceleration")
                    .attr("accel3d", yes_no(a.accel3d))
                    .attr("accel2d", yes_no(a.accel2d)),
            );
        }
        w.element_with(model, inner);
        self.info.format(w, flags);
        w.close("video");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::xml::parse_document;

    fn parse(xml: &str, virt: VirtType, os: &str) -> Result<VideoDef> {
        VideoDef::parse(&parse_document(xml)?, XmlFlags::INACTIVE, virt, os)
    }

    #[test]
    fn defaults_follow_hypervisor() {
        let cases: &[(VirtType, &str, VideoType, u32)] = &[
            (VirtType::Kvm, "hvm", VideoType::Cirrus, 9216),
            (VirtType::Xen, "xen", VideoType::Xen, 4096),
            (VirtType::Xen, "linux", VideoType::Xen, 4096),
            (VirtType::Vbox, "hvm", VideoType::Vbox, 8192),
            (VirtType::Vmware, "hvm", VideoType::Vmvga, 4096),
        ];
        for (virt, os, kind, vram) in cases {
            let v = parse("<video/>", *virt, os).unwrap();
            assert_eq!(
                (v.kind, v.vram, v.heads),
                (*kind, *vram, 1),
                "{:?}",
                virt
            );
        }
        assert!(parse("<video/>", VirtType::Lxc, "exe").is_err());
        assert_eq!(default_vram(VideoType::Qxl, VirtType::Kvm), 65536);
        assert_eq!(default_vram(VideoType::Vga, VirtType::Vbox), 8192);
    }

    #[test]
    fn explicit_model() {
        let v = parse(
            "<video><model type='qxl' vram='32768' heads='2'>\
             <acceleration accel3d='yes'/></model></video>",
            VirtType::Kvm,
            "hvm",
        )
        .unwrap();
        assert_eq!(v.accel, Some(VideoAccel { accel3d: true, accel2d: false }));
        let mut w = XmlWriter::new();
        v.format(&mut w, XmlFlags::INACTIVE).unwrap();
        assert_eq!(
            w.as_str(),
            "<video>\n  <model type='qxl' vram='32768' heads='2'>\n    \
             <acceleration accel3d='yes' accel2d='no'/>\n  </model>\n</video>\n"
        );
        let bad = "<video><model type='matrox'/></video>";
        assert!(parse(bad, VirtType::Kvm, "hvm").is_err());

    }
}
