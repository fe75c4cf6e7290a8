// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Closed vocabularies used by domain documents.
//!
//! Each vocabulary is a plain enum whose string forms are generated by
//! `strum`, so a value can never be out of range when it is serialized.
//! [`parse_enum`] turns an unknown string into a
//! [`Error::ConfigUnsupported`] naming the vocabulary and the offending
//! value.

use std::str::FromStr;

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::{Error, Result};

pub trait VirEnum: FromStr + Copy + Into<&'static str> {
    /// Human readable name of the vocabulary, used in error messages.
    const WHAT: &'static str;

    fn as_str(self) -> &'static str {
        self.into()
    }
}

pub fn parse_enum<T: VirEnum>(s: &str) -> Result<T> {
    s.parse::<T>().map_err(|_| {
        Error::ConfigUnsupported(format!("unknown {} '{}'", T::WHAT, s))
    })
}

macro_rules! vir_enum {
    ($($ty:ty => $what:literal),* $(,)?) => {
        $(
            impl VirEnum for $ty {
                const WHAT: &'static str = $what;
            }
        )*
    };
}

/// The shared `default`/`on`/`off` switch.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum TriState {
    #[default]
    Default,
    On,
    Off,
}

impl TriState {
    pub fn is_default(self) -> bool {
        self == TriState::Default
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
    EnumIter,
)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum VirtType {
    Qemu,
    Kqemu,
    Kvm,
    Xen,
    Lxc,
    Uml,
    Openvz,
    Vserver,
    Ldom,
    Test,
    Vmware,
    Hyperv,
    Vbox,
    One,
    Phyp,
}

impl VirtType {
    /// This type's bit in an expected-virt-types mask.
    pub fn mask(self) -> u32 {
        1 << (self as u8)
    }

    pub const ALL_MASK: u32 = (1 << 15) - 1;
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum DiskType {
    Block,
    #[default]
    File,
    Dir,
    Network,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum DiskDevice {
    #[default]
    Disk,
    Cdrom,
    Floppy,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum DiskBus {
    #[default]
    Ide,
    Fdc,
    Scsi,
    Virtio,
    Xen,
    Usb,
    Uml,
    Sata,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum DiskCache {
    #[default]
    Default,
    None,
    Writethrough,
    Writeback,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum DiskErrorPolicy {
    #[default]
    Default,
    Stop,
    Ignore,
    Enospace,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum DiskIo {
    #[default]
    Default,
    Native,
    Threads,
}

/// How a disk takes part in snapshots.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum SnapshotMode {
    #[default]
    Default,
    No,
    Internal,
    External,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum DiskProtocol {
    Nbd,
    Rbd,
    Sheepdog,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum EncryptionFormat {
    #[default]
    Default,
    Qcow,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display,
)]
#[strum(serialize_all = "kebab-case")]
pub enum ControllerType {
    Ide,
    Fdc,
    Scsi,
    Sata,
    VirtioSerial,
    Ccid,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum ControllerModel {
    Auto,
    Buslogic,
    Lsilogic,
    Lsisas1068,
    Vmpvscsi,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum FsType {
    #[default]
    Mount,
    Block,
    File,
    Template,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum FsDriver {
    #[default]
    Default,
    Path,
    Handle,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum FsAccessMode {
    #[default]
    Passthrough,
    Mapped,
    Squash,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum NetType {
    #[default]
    User,
    Ethernet,
    Server,
    Client,
    Mcast,
    Network,
    Bridge,
    Internal,
    Direct,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum NetBackend {
    #[default]
    Default,
    Qemu,
    Vhost,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum NetTxMode {
    #[default]
    Default,
    Iothread,
    Timer,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum MacvtapMode {
    #[default]
    Vepa,
    Private,
    Bridge,
    Passthrough,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display,
)]
pub enum VirtualPortType {
    #[strum(serialize = "802.1Qbg")]
    Qbg,
    #[strum(serialize = "802.1Qbh")]
    Qbh,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum ChrDeviceType {
    Parallel,
    Serial,
    Console,
    Channel,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum ChrType {
    Null,
    Vc,
    #[default]
    Pty,
    Dev,
    File,
    Pipe,
    Stdio,
    Udp,
    Tcp,
    Unix,
    Spicevmc,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum ChrTcpProtocol {
    #[default]
    Raw,
    Telnet,
    Telnets,
    Tls,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum ChannelTargetType {
    Guestfwd,
    Virtio,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum ConsoleTargetType {
    #[default]
    Serial,
    Xen,
    Uml,
    Virtio,
    Lxc,
    Openvz,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum SpicevmcName {
    Vdagent,
    Smartcard,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SmartcardMode {
    Host,
    HostCertificates,
    Passthrough,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum InputType {
    Mouse,
    Tablet,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum InputBus {
    Ps2,
    Usb,
    Xen,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum SoundModel {
    Sb16,
    Es1370,
    Pcspk,
    Ac97,
    Ich6,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum VideoType {
    Vga,
    Cirrus,
    Vmvga,
    Xen,
    Vbox,
    Qxl,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum HostdevMode {
    #[default]
    Subsystem,
    Capabilities,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum HostdevSubsysType {
    Usb,
    Pci,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum WatchdogModel {
    I6300esb,
    Ib700,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum WatchdogAction {
    #[default]
    Reset,
    Shutdown,
    Poweroff,
    Pause,
    Dump,
    None,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum MemballoonModel {
    Virtio,
    Xen,
    None,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum GraphicsType {
    Sdl,
    Vnc,
    Rdp,
    Desktop,
    Spice,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum ListenType {
    #[default]
    None,
    Address,
    Network,
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
    EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum SpiceChannelName {
    Main,
    Display,
    Inputs,
    Cursor,
    Playback,
    Record,
    Smartcard,
}

impl SpiceChannelName {
    pub const COUNT: usize = 7;
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum SpiceChannelMode {
    #[default]
    Any,
    Secure,
    Insecure,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "snake_case")]
pub enum SpiceImageCompression {
    #[default]
    Default,
    AutoGlz,
    AutoLz,
    Quic,
    Glz,
    Lz,
    Off,
}

/// Shared by the spice `jpeg` and `zlib` compression settings.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum SpiceWanCompression {
    #[default]
    Default,
    Auto,
    Never,
    Always,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum SpiceStreamingMode {
    #[default]
    Default,
    Filter,
    All,
    Off,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum SpiceClipboardCopyPaste {
    #[default]
    Default,
    Yes,
    No,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display,
)]
#[strum(serialize_all = "kebab-case")]
pub enum LifecycleAction {
    Destroy,
    Restart,
    RenameRestart,
    Preserve,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display,
)]
#[strum(serialize_all = "kebab-case")]
pub enum CrashAction {
    Destroy,
    Restart,
    RenameRestart,
    Preserve,
    CoredumpDestroy,
    CoredumpRestart,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum ClockBasis {
    Utc,
    Localtime,
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
    EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum TimerName {
    Platform,
    Pit,
    Rtc,
    Hpet,
    Tsc,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum TimerTrack {
    Boot,
    Guest,
    Wall,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum TimerTickPolicy {
    Delay,
    Catchup,
    Merge,
    Discard,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum TimerMode {
    Auto,
    Native,
    Emulate,
    Paravirt,
    Smpsafe,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum SeclabelType {
    #[default]
    Dynamic,
    Static,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum NumatuneMode {
    #[default]
    Strict,
    Preferred,
    Interleave,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum BootDev {
    Fd,
    Cdrom,
    Hd,
    Network,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum SmbiosMode {
    None,
    Emulate,
    Host,
    Sysinfo,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum DomainState {
    #[default]
    Nostate,
    Running,
    Blocked,
    Paused,
    Shutdown,
    Shutoff,
    Crashed,
}

/// The domain states plus the snapshot-only `disk-snapshot`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, IntoStaticStr, Display,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SnapshotState {
    Nostate,
    Running,
    Blocked,
    Paused,
    Shutdown,
    Shutoff,
    Crashed,
    DiskSnapshot,
}

impl From<DomainState> for SnapshotState {
    fn from(s: DomainState) -> Self {
        match s {
            DomainState::Nostate => SnapshotState::Nostate,
            DomainState::Running => SnapshotState::Running,
            DomainState::Blocked => SnapshotState::Blocked,
            DomainState::Paused => SnapshotState::Paused,
            DomainState::Shutdown => SnapshotState::Shutdown,
            DomainState::Shutoff => SnapshotState::Shutoff,
            DomainState::Crashed => SnapshotState::Crashed,
        }
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "kebab-case")]
pub enum CpuMode {
    #[default]
    Custom,
    HostModel,
    HostPassthrough,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum CpuMatch {
    Minimum,
    #[default]
    Exact,
    Strict,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum CpuFallback {
    #[default]
    Allow,
    Forbid,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum CpuFeaturePolicy {
    Force,
    #[default]
    Require,
    Optional,
    Disable,
    Forbid,
}

vir_enum! {
    TriState => "switch value",
    VirtType => "domain type",
    DiskType => "disk type",
    DiskDevice => "disk device",
    DiskBus => "disk bus type",
    DiskCache => "disk cache mode",
    DiskErrorPolicy => "disk error policy",
    DiskIo => "disk io mode",
    SnapshotMode => "disk snapshot setting",
    DiskProtocol => "network source protocol type",
    EncryptionFormat => "volume encryption format",
    ControllerType => "controller type",
    ControllerModel => "controller model",
    FsType => "filesystem type",
    FsDriver => "fs driver type",
    FsAccessMode => "accessmode",
    NetType => "interface type",
    NetBackend => "interface backend",
    NetTxMode => "interface txmode",
    MacvtapMode => "macvtap mode",
    VirtualPortType => "virtualport type",
    ChrDeviceType => "character device",
    ChrType => "character device source type",
    ChrTcpProtocol => "character device protocol",
    ChannelTargetType => "channel target type",
    ConsoleTargetType => "console target type",
    SpicevmcName => "spicevmc device",
    SmartcardMode => "smartcard device mode",
    InputType => "input device type",
    InputBus => "input bus type",
    SoundModel => "sound model",
    VideoType => "video model",
    HostdevMode => "hostdev mode",
    HostdevSubsysType => "host device type",
    WatchdogModel => "watchdog model",
    WatchdogAction => "watchdog action",
    MemballoonModel => "memory balloon model",
    GraphicsType => "graphics device type",
    ListenType => "graphics listen type",
    SpiceChannelName => "spice channel name",
    SpiceChannelMode => "spice channel mode",
    SpiceImageCompression => "spice image compression",
    SpiceWanCompression => "spice compression",
    SpiceStreamingMode => "spice streaming mode",
    SpiceClipboardCopyPaste => "spice clipboard copypaste value",
    LifecycleAction => "lifecycle action",
    CrashAction => "crash action",
    ClockBasis => "clock basis",
    TimerName => "timer name",
    TimerTrack => "timer track",
    TimerTickPolicy => "timer tickpolicy",
    TimerMode => "timer mode",
    SeclabelType => "security type",
    NumatuneMode => "NUMA memory tuning mode",
    BootDev => "boot device",
    SmbiosMode => "smbios mode",
    DomainState => "domain state",
    SnapshotState => "snapshot state",
    CpuMode => "CPU mode",
    CpuMatch => "CPU match",
    CpuFallback => "CPU fallback",
    CpuFeaturePolicy => "CPU feature policy",
}

#[cfg(test)]
mod test {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn string_forms() {
        assert_eq!(ControllerType::VirtioSerial.as_str(), "virtio-serial");
        assert_eq!(
            SmartcardMode::HostCertificates.to_string(),
            "host-certificates"
        );
        assert_eq!(CrashAction::CoredumpRestart.as_str(), "coredump-restart");
        assert_eq!(SnapshotState::DiskSnapshot.as_str(), "disk-snapshot");
        assert_eq!(SpiceImageCompression::AutoGlz.as_str(), "auto_glz");
        assert_eq!(VirtualPortType::Qbh.as_str(), "802.1Qbh");
        assert_eq!(CpuMode::HostModel.as_str(), "host-model");
        assert_eq!(InputBus::Ps2.as_str(), "ps2");
    }

    #[test]
    fn unknown_value_is_config_unsupported() {
        let err = parse_enum::<DiskBus>("firewire").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ConfigUnsupported);
        assert!(err.to_string().contains("unknown disk bus type 'firewire'"));
        assert_eq!(parse_enum::<DiskBus>("virtio").unwrap(), DiskBus::Virtio);
    }

    #[test]
    fn virt_type_masks_are_distinct() {
        let mut seen = 0u32;
        for vt in VirtType::iter() {
            assert_eq!(seen & vt.mask(), 0);
            seen |= vt.mask();
        }
        assert_eq!(seen, VirtType::ALL_MASK);
    }
}
