// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Writing a [`DomainDef`] back out as a `<domain>` document.

use std::borrow::Cow;

use super::{DomainDef, DomainFeatures};
use crate::caps::Capabilities;
use crate::context::XmlFlags;
use crate::cpu::CpuDef;
use crate::device::InputDef;
use crate::enums::CpuMode;
use crate::error::{Error, Result};
use crate::xml::{Tag, XmlWriter};

impl DomainDef {
    /// Serializes the definition. `flags` selects the projection; see
    /// [`XmlFlags`]. Expanding a host-model CPU needs the host CPU, so
    /// [`XmlFlags::UPDATE_CPU`] is only accepted by
    /// [`DomainDef::format_with_caps`].
    pub fn format(&self, flags: XmlFlags) -> Result<String> {
        self.format_inner(None, flags)
    }

    pub fn format_with_caps(
        &self,
        caps: &Capabilities,
        flags: XmlFlags,
    ) -> Result<String> {
        self.format_inner(Some(caps), flags)
    }

    fn guest_cpu(
        &self,
        caps: Option<&Capabilities>,
        flags: XmlFlags,
    ) -> Result<Option<Cow<'_, CpuDef>>> {
        let Some(cpu) = &self.cpu else {
            return Ok(None);
        };
        if !flags.contains(XmlFlags::UPDATE_CPU)
            || cpu.mode != CpuMode::HostModel
        {
            return Ok(Some(Cow::Borrowed(cpu)));
        }
        let caps = caps.ok_or_else(|| {
            Error::OperationInvalid(
                "updating the guest CPU requires host capabilities".to_string(),
            )
        })?;
        let host = caps.host_cpu.as_ref().ok_or_else(|| {
            Error::OperationFailed(
                "cannot update guest CPU data: host CPU is unknown".to_string(),
            )
        })?;
        let mut updated = cpu.clone();
        updated.update_from_host(host)?;
        Ok(Some(Cow::Owned(updated)))
    }

    fn format_inner(
        &self,
        caps: Option<&Capabilities>,
        flags: XmlFlags,
    ) -> Result<String> {
        let inactive = flags.contains(XmlFlags::INACTIVE);
        let cpu = self.guest_cpu(caps, flags)?;

        let mut root = Tag::new("domain")
            .attr("type", self.virt_type)
            .attr_if(!inactive && self.id != -1, "id", self.id);
        if let Some(ns) = &self.namespace {
            root = root.attr(
                &format!("xmlns:{}", ns.handler.prefix()),
                ns.handler.href(),
            );
        }

        let mut w = XmlWriter::new();
        w.open(root);
        w.leaf(Tag::new("name"), &self.name);
        w.leaf(Tag::new("uuid"), self.uuid.hyphenated());
        w.leaf_opt("description", self.description.as_deref());

        self.mem.format_sizes(&mut w);
        self.blkio.format(&mut w);
        self.mem.format_memtune(&mut w);
        self.mem.format_backing(&mut w);
        self.vcpu.format(&mut w);
        self.cputune.format(&mut w);
        if let Some(numatune) = &self.numatune {
            numatune.format(&mut w);
        }
        if let Some(sysinfo) = &self.sysinfo {
            sysinfo.format(&mut w);
        }

        self.os.format(&mut w);

        let mut features = w.nested();
        for (name, flag) in DomainFeatures::NAMES {
            if self.features.contains(*flag) {
                features.empty(Tag::new(name));
            }
        }
        w.element_if_nonempty(Tag::new("features"), features);

        if let Some(cpu) = &cpu {
            cpu.format(&mut w);
        }
        self.clock.format(&mut w);

        w.leaf(Tag::new("on_poweroff"), self.on_poweroff);
        w.leaf(Tag::new("on_reboot"), self.on_reboot);
        w.leaf(Tag::new("on_crash"), self.on_crash);

        w.open(Tag::new("devices"));
        self.format_devices(&mut w, flags)?;
        w.close("devices");

        if let Some(seclabel) = &self.seclabel {
            seclabel.format(&mut w, flags);
        }
        if let Some(ns) = &self.namespace {
            ns.handler.format(&mut w, ns.data.as_ref())?;
        }
        w.close("domain");
        Ok(w.into_string())
    }

    fn format_devices(&self, w: &mut XmlWriter, flags: XmlFlags) -> Result<()> {
        let hvm = self.os.is_hvm();

        w.leaf_opt("emulator", self.emulator.as_deref());
        for disk in &self.disks {
            disk.format(w, flags)?;
        }
        for ctrl in &self.controllers {
            ctrl.format(w, flags)?;
        }
        for lease in &self.leases {
            lease.format(w)?;
        }
        for fs in &self.fss {
            fs.format(w, flags)?;
        }
        for net in &self.nets {
            net.format(w, flags)?;
        }
        for card in &self.smartcards {
            card.format(w, flags)?;
        }
        for serial in &self.serials {
            serial.format(w, flags)?;
        }
        for parallel in &self.parallels {
            parallel.format(w, flags)?;
        }

        match (&self.console, self.serials.first()) {
            (Some(console), _) => console.format(w, flags)?,
            (None, Some(serial)) => serial.format_as_console(w, flags)?,
            (None, None) => {}
        }

        for channel in &self.channels {
            channel.format(w, flags)?;
        }

        for input in self.inputs.iter().filter(|i| !i.is_implicit_mouse(hvm)) {
            input.format(w, flags)?;
        }
        if hvm || !self.graphics.is_empty() {
            InputDef::implicit_mouse(hvm).format(w, flags)?;
        }

        for graphics in &self.graphics {
            graphics.format(w, flags)?;
        }
        for sound in &self.sounds {
            sound.format(w, flags)?;
        }
        for video in &self.videos {
            video.format(w, flags)?;
        }
        for hostdev in &self.hostdevs {
            if hostdev.ephemeral
                && flags.contains(XmlFlags::NO_EPHEMERAL_DEVICES)
            {
                continue;
            }
            hostdev.format(w, flags)?;
        }
        if let Some(watchdog) = &self.watchdog {
            watchdog.format(w, flags)?;
        }
        if let Some(balloon) = &self.memballoon {
            balloon.format(w, flags)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::any::Any;
    use std::sync::Arc;

    use super::*;
    use crate::context::test::test_ctx;
    use crate::context::{NamespaceHandler, ParseContext};
    use crate::cpu::CpuType;
    use crate::xml::{parse_document, Element};
    use crate::ErrorKind;

    const MINIMAL: &str = "<domain type='kvm'>\
        <name>v1</name>\
        <uuid>9a3c8b1e-5d7f-4c2a-9e1b-0f6d2a8c4b3e</uuid>\
        <memory>524288</memory>\
        <vcpu>1</vcpu>\
        <os><type arch='x86_64' machine='pc'>hvm</type></os>\
        </domain>";

    fn inactive() -> ParseContext {
        test_ctx().with_flags(XmlFlags::INACTIVE)
    }

    #[test]
    fn minimal_output() {
        let dom = DomainDef::parse_str(MINIMAL, &inactive()).unwrap();
        let expected = "\
<domain type='kvm'>
  <name>v1</name>
  <uuid>9a3c8b1e-5d7f-4c2a-9e1b-0f6d2a8c4b3e</uuid>
  <memory unit='KiB'>524288</memory>
  <currentMemory unit='KiB'>524288</currentMemory>
  <vcpu>1</vcpu>
  <os>
    <type arch='x86_64' machine='pc'>hvm</type>
    <boot dev='hd'/>
  </os>
  <clock offset='utc'/>
  <on_poweroff>destroy</on_poweroff>
  <on_reboot>restart</on_reboot>
  <on_crash>destroy</on_crash>
  <devices>
    <input type='mouse' bus='ps2'/>
    <memballoon model='virtio'/>
  </devices>
</domain>
";
        assert_eq!(dom.format(XmlFlags::INACTIVE).unwrap(), expected);
    }

    #[test]
    fn output_is_stable() {
        let xml = MINIMAL.replace(
            "</os>",
            "</os><features><pae/><acpi/></features><devices>\
             <disk type='file'><source file='/v.img'/><target dev='hdc'/>\
             </disk>\
             <serial type='pty'/>\
             <input type='tablet' bus='usb'/>\
             <graphics type='vnc' autoport='yes'/>\
             </devices>",
        );
        let first = DomainDef::parse_str(&xml, &inactive())
            .unwrap()
            .format(XmlFlags::INACTIVE)
            .unwrap();
        let second = DomainDef::parse_str(&first, &inactive())
            .unwrap()
            .format(XmlFlags::INACTIVE)
            .unwrap();
        assert_eq!(first, second);

        assert!(first
            .contains("<features>\n    <acpi/>\n    <pae/>\n  </features>"));
        assert_eq!(first.matches("<input type='mouse' bus='ps2'/>").count(), 1);
        assert_eq!(first.matches("<console type='pty'>").count(), 1);
        assert!(first.contains("<controller type='ide' index='0'"));
    }

    #[test]
    fn runtime_id_is_live_only() {
        let xml = MINIMAL.replace("type='kvm'", "type='kvm' id='3'");
        let dom = DomainDef::parse_str(&xml, &test_ctx()).unwrap();
        let live = dom.format(XmlFlags::empty()).unwrap();
        assert!(live.starts_with("<domain type='kvm' id='3'>"));
        let config = dom.format(XmlFlags::INACTIVE).unwrap();
        assert!(config.starts_with("<domain type='kvm'>"));
    }

    #[test]
    fn update_cpu_needs_host() {
        let mut dom = DomainDef::parse_str(MINIMAL, &inactive()).unwrap();
        dom.cpu = Some(
            CpuDef::parse(
                &parse_document("<cpu mode='host-model'/>").unwrap(),
                CpuType::Guest,
            )
            .unwrap(),
        );

        let err = dom.format(XmlFlags::UPDATE_CPU).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OperationInvalid);

        let mut caps = crate::caps::test::test_caps();
        let err =
            dom.format_with_caps(&caps, XmlFlags::UPDATE_CPU).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OperationFailed);

        caps.host_cpu = Some(
            CpuDef::parse(
                &parse_document(
                    "<cpu><arch>x86_64</arch><model>Westmere</model>\
                     <vendor>Intel</vendor></cpu>",
                )
                .unwrap(),
                CpuType::Host,
            )
            .unwrap(),
        );
        let out = dom.format_with_caps(&caps, XmlFlags::UPDATE_CPU).unwrap();
        assert!(out.contains("Westmere"));
        assert!(!out.contains("host-model"));

        assert!(dom.format(XmlFlags::INACTIVE).unwrap().contains("host-model"));
    }

    struct Notes;

    impl NamespaceHandler for Notes {
        fn prefix(&self) -> &str {
            "notes"
        }

        fn href(&self) -> &str {
            "http://example.org/notes"
        }

        fn parse(
            &self,
            root: &Element,
        ) -> Result<Option<Arc<dyn Any + Send + Sync>>> {
            Ok(root
                .path_text("notes:text")
                .map(|t| Arc::new(t.to_string()) as Arc<dyn Any + Send + Sync>))
        }

        fn format(
            &self,
            w: &mut XmlWriter,
            data: &(dyn Any + Send + Sync),
        ) -> Result<()> {
            let text = data.downcast_ref::<String>().ok_or_else(|| {
                Error::Internal("unexpected namespace data".to_string())
            })?;
            w.leaf(Tag::new("notes:text"), text);
            Ok(())
        }
    }

    #[test]
    fn namespace_payload_round_trips() {
        let ctx = inactive().with_namespace(Arc::new(Notes));
        let xml = MINIMAL
            .replace(
                "<domain type='kvm'>",
                "<domain type='kvm' xmlns:notes='http://example.org/notes'>",
            )
            .replace("</domain>", "<notes:text>hello</notes:text></domain>");
        let dom = DomainDef::parse_str(&xml, &ctx).unwrap();
        let out = dom.format(XmlFlags::INACTIVE).unwrap();
        assert!(out.starts_with(
            "<domain type='kvm' xmlns:notes='http://example.org/notes'>"
        ));

        assert!(out.contains("  <notes:text>hello</notes:text>\n</domain>"));

        let plain = DomainDef::parse_str(&xml, &inactive()).unwrap();
        assert!(plain.namespace.is_none());
    }
}
