// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `<os>` block and the boot loader settings next to it.

use crate::context::ParseContext;
use crate::enums::{parse_enum, BootDev, SmbiosMode, VirtType};
use crate::error::{Error, Result};
use crate::xml::{Element, Tag, XmlWriter};

/// At most this many `<boot dev>` entries are honoured.
pub const MAX_BOOT_DEVS: usize = 4;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OsDef {
    pub os_type: String,
    pub arch: String,
    pub machine: Option<String>,
    /// Container init binary; `exe` guests only.
    pub init: Option<String>,
    pub kernel: Option<String>,
    pub initrd: Option<String>,
    pub cmdline: Option<String>,
    pub root: Option<String>,
    pub loader: Option<String>,
    pub bootloader: Option<String>,
    pub bootloader_args: Option<String>,
    pub boot_devs: Vec<BootDev>,
    pub bootmenu: Option<bool>,
    pub bios_useserial: Option<bool>,
    pub smbios_mode: Option<SmbiosMode>,
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

impl OsDef {
    pub fn is_hvm(&self) -> bool {
        self.os_type == "hvm"
    }

    /// Parses the `<os>` block of `root`. `per_device_boot` tells whether
    /// any device carries its own `<boot order>`, which excludes global
    /// boot devices.
    pub fn parse(
        root: &Element,
        ctx: &ParseContext,
        virt_type: VirtType,
        per_device_boot: bool,
    ) -> Result<Self> {
        let text = |path: &str| root.path_text(path).map(str::to_owned);

        let mut os = OsDef {
            bootloader: text("bootloader"),
            bootloader_args: text("bootloader_args"),
            ..Default::default()
        };

        os.os_type = match root.path_text("os/type") {
            Some("linux") => "xen".to_string(),
            Some(t) => t.to_owned(),
            None if os.bootloader.is_some() => "xen".to_string(),
            None => {
                return Err(Error::Xml(
                    "an os <type> must be specified".to_string(),
                ))
            }
        };

        let caps = &ctx.caps;
        if !caps.supports_os_type(&os.os_type) {
            return Err(Error::OsType(os.os_type));
        }

        os.arch = match root.path_attr("os/type", "arch") {
            Some(arch) => {
                if !caps.supports_arch(&os.os_type, arch) {
                    return Err(Error::ConfigUnsupported(format!(
                        "os type '{}' & arch '{}' combination is not supported",
                        os.os_type, arch
                    )));
                }
                arch.to_owned()
            }
            None => caps
                .default_arch(&os.os_type, virt_type)
                .ok_or_else(|| {
                    Error::Internal(format!(
                        "no supported architecture for os type '{}'",
                        os.os_type
                    ))
                })?
                .to_owned(),
        };

        os.machine = match root.path_attr("os/type", "machine") {
            Some(m) => Some(m.to_owned()),
            None => caps
                .default_machine(&os.os_type, &os.arch, virt_type)
                .map(str::to_owned),
        };

        if os.os_type == "exe" {
            os.init = text("os/init").or_else(|| caps.default_init.clone());
            if os.init.is_none() {
                return Err(Error::Internal(
                    "init binary must be specified".to_string(),
                ));
            }
        }

        if matches!(os.os_type.as_str(), "xen" | "hvm" | "uml") {
            os.kernel = text("os/kernel");
            os.initrd = text("os/initrd");
            os.cmdline = text("os/cmdline");
            os.root = text("os/root");
            os.loader = text("os/loader");
        }

        if os.is_hvm() {
            os.parse_boot(root, per_device_boot)?;
        }

        os.smbios_mode = match root.path_attr("os/smbios", "mode") {
            Some(m) => Some(parse_enum(m)?),
            None if root.path("os/smbios").is_some() => {
                return Err(Error::Xml(
                    "missing smbios mode attribute".to_string(),
                ))
            }
            None => None,
        };

        Ok(os)
    }

    fn parse_boot(
        &mut self,
        root: &Element,
        per_device_boot: bool,
    ) -> Result<()> {
        let boots = root.path_all("os/boot");
        if per_device_boot && !boots.is_empty() {
            return Err(Error::ConfigUnsupported(
                "per-device boot elements cannot be mixed with os/boot elements"
                    .to_string(),
            ));
        }

        for node in boots.into_iter().take(MAX_BOOT_DEVS) {
            let dev = node.attr("dev").ok_or_else(|| {
                Error::Internal("missing boot device".to_string())
            })?;
            self.boot_devs.push(parse_enum(dev)?);
        }
        if self.boot_devs.is_empty() && !per_device_boot {
            self.boot_devs.push(BootDev::Hd);
        }

        self.bootmenu = match root.path("os/bootmenu") {
            Some(menu) => menu.attr_yes_no("enable")?,
            None => None,
        };
        self.bios_useserial = match root.path("os/bios") {
            Some(bios) => bios.attr_yes_no("useserial")?,
            None => None,
        };
        Ok(())
    }

    /// Writes `<bootloader>`, `<bootloader_args>` and the `<os>` block.
    pub fn format(&self, w: &mut XmlWriter) {
        w.leaf_opt("bootloader", self.bootloader.as_deref());
        w.leaf_opt("bootloader_args", self.bootloader_args.as_deref());

        w.open(Tag::new("os"));
        w.leaf(
            Tag::new("type")
                .attr("arch", &self.arch)
                .attr_opt("machine", self.machine.as_deref()),
            &self.os_type,
        );
        w.leaf_opt("init", self.init.as_deref());
        w.leaf_opt("loader", self.loader.as_deref());
        for dev in &self.boot_devs {
            w.empty(Tag::new("boot").attr("dev", dev));
        }
        if let Some(menu) = self.bootmenu {
            w.empty(Tag::new("bootmenu").attr("enable", yes_no(menu)));
        }
        w.leaf_opt("kernel", self.kernel.as_deref());
        w.leaf_opt("initrd", self.initrd.as_deref());
        w.leaf_opt("cmdline", self.cmdline.as_deref());
        w.leaf_opt("root", self.root.as_deref());
        if let Some(mode) = self.smbios_mode {
            w.empty(Tag::new("smbios").attr("mode", mode));
        }
        if let Some(useserial) = self.bios_useserial {
            w.empty(Tag::new("bios").attr("useserial", yes_no(useserial)));
        }
        w.close("os");
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::test::test_ctx;
    use crate::xml::parse_document;
    use crate::ErrorKind;

    const HVM: &str = "<domain><os><type>hvm</type></os></domain>";

    fn parse(
        xml: &str,
        virt: VirtType,
        per_device_boot: bool,
    ) -> Result<OsDef> {
        OsDef::parse(&parse_document(xml)?, &test_ctx(), virt, per_device_boot)
    }

    #[test]
    fn hvm_defaults() {
        let os = parse(HVM, VirtType::Kvm, false).unwrap();
        assert_eq!(os.arch, "x86_64");
        assert_eq!(os.machine.as_deref(), Some("pc"));
        assert_eq!(os.boot_devs, vec![BootDev::Hd]);

        let mut w = XmlWriter::new();
        os.format(&mut w);
        assert_eq!(
            w.as_str(),
            "<os>\n  <type arch='x86_64' machine='pc'>hvm</type>\n  \
             <boot dev='hd'/>\n</os>\n"
        );

        let os = parse(HVM, VirtType::Kvm, true).unwrap();
        assert!(os.boot_devs.is_empty());
    }

    #[test]
    fn boot_device_limit_and_options() {
        let os = parse(
            "<domain><os><type arch='i686'>hvm</type><boot dev='network'/>\
             <boot dev='cdrom'/><boot dev='fd'/><boot dev='hd'/>\
             <boot dev='hd'/><bootmenu enable='yes'/><bios useserial='no'/>\
             </os></domain>",
            VirtType::Qemu,
            false,
        )
        .unwrap();
        assert_eq!(os.boot_devs.len(), MAX_BOOT_DEVS);
        assert_eq!(os.boot_devs[0], BootDev::Network);
        assert_eq!(os.bootmenu, Some(true));
        assert_eq!(os.bios_useserial, Some(false));
        assert!(parse(
            "<domain><os><type>hvm</type><boot dev='usb'/></os></domain>",
            VirtType::Kvm,
            false
        )
        .is_err());
    }

    #[test]
    fn mixing_boot_styles_is_rejected() {
        let err = parse(
            "<domain><os><type>hvm</type><boot dev='hd'/></os></domain>",
            VirtType::Kvm,
            true,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigUnsupported);
        assert!(err.to_string().contains("mixed"));
    }

    #[test]
    fn os_type_aliases_and_errors() {
        let os = parse(
            "<domain><bootloader>/usr/bin/pygrub</bootloader></domain>",
            VirtType::Xen,
            false,
        )
        .unwrap();
        assert_eq!(os.os_type, "xen");
        assert_eq!(os.machine.as_deref(), Some("xenpv"));
        assert!(os.boot_devs.is_empty());

        let os = parse(
            "<domain><os><type>linux</type></os></domain>",
            VirtType::Xen,
            false,
        )
        .unwrap();
        assert_eq!(os.os_type, "xen");

        let err = parse(
            "<domain><os><type>dos</type></os></domain>",
            VirtType::Kvm,
            false,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OsType);
        assert!(parse("<domain/>", VirtType::Kvm, false).is_err());
        assert!(parse(
            "<domain><os><type arch='sparc'>hvm</type></os></domain>",
            VirtType::Kvm,
            false
        )
        .is_err());
    }

    #[test]
    fn exe_init_defaults_from_caps() {
        let os = parse(
            "<domain><os><type>exe</type></os></domain>",
            VirtType::Lxc,
            false,
        )
        .unwrap();

        assert_eq!(os.init.as_deref(), Some("/sbin/init"));
        let os = parse(
            "<domain><os><type>exe</type><init>/bin/sh</init></os></domain>",
            VirtType::Lxc,
            false,
        )
        .unwrap();
        assert_eq!(os.init.as_deref(), Some("/bin/sh"));
    }
}
