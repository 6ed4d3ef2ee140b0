//! Serial port discovery and classification.

use super::SourceError;

use serialport::SerialPortType;
use std::fmt;

/// USB vendor/product pairs of boards we know how to talk to.
const KNOWN_IDS: &[(u16, u16)] = &[
    (0x2341, 0x0043), // Uno
    (0x2341, 0x0001),
    (0x2341, 0x0243), // Leonardo
    (0x2341, 0x8036), // Mega 2560
    (0x2341, 0x804D), // Mega ADK
    (0x2341, 0x804E), // Leonardo ETH
    (0x10C4, 0xEA60), // CP210x UART bridge
    (0x1A86, 0x7523), // CH340 converter
];

/// What we know about an attached serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub path: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl PortInfo {
    /// A port with a path and no USB metadata.
    pub fn bare(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        }
    }
}

impl fmt::Display for PortInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let na = |o: &Option<String>| o.clone().unwrap_or_else(|| "N/A".to_owned());
        writeln!(f, "Device         : {}", self.path)?;
        writeln!(f, "Manufacturer   : {}", na(&self.manufacturer))?;
        writeln!(f, "Product        : {}", na(&self.product))?;
        writeln!(f, "Serial Number  : {}", na(&self.serial_number))?;
        match (self.vid, self.pid) {
            (Some(vid), Some(pid)) => write!(f, "VID:PID        : {vid:04X}:{pid:04X}"),
            _ => write!(f, "VID:PID        : N/A"),
        }
    }
}

/// Operating system conventions for device paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Linux,
    Windows,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Other
        }
    }

    fn device_prefixes(&self) -> &'static [&'static str] {
        match self {
            Platform::MacOs => &["/dev/cu.usbmodem", "/dev/cu.usbserial"],
            Platform::Linux => &["/dev/ttyACM", "/dev/ttyUSB"],
            Platform::Windows | Platform::Other => &[],
        }
    }
}

/// Outcome of matching the attached ports against known boards. Finding no
/// board is an ordinary outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortMatch {
    Single(PortInfo),
    NoMatch,
    Ambiguous(Vec<PortInfo>),
}

/// Whether `port` looks like a data logger board.
pub fn is_candidate(port: &PortInfo, platform: Platform) -> bool {
    if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        if KNOWN_IDS.contains(&(vid, pid)) {
            return true;
        }
    }

    let mentions_arduino = |o: &Option<String>| {
        o.as_deref()
            .is_some_and(|s| s.to_lowercase().contains("arduino"))
    };
    if mentions_arduino(&port.product) || mentions_arduino(&port.manufacturer) {
        return true;
    }

    platform
        .device_prefixes()
        .iter()
        .any(|prefix| port.path.starts_with(prefix))
}

/// Sorts the attached ports into no, one, or several candidates.
pub fn classify(ports: &[PortInfo], platform: Platform) -> PortMatch {
    let mut candidates: Vec<PortInfo> = ports
        .iter()
        .filter(|p| is_candidate(p, platform))
        .cloned()
        .collect();

    match candidates.len() {
        0 => PortMatch::NoMatch,
        1 => PortMatch::Single(candidates.remove(0)),
        _ => PortMatch::Ambiguous(candidates),
    }
}

/// Something that can list the serial ports attached to this machine.
pub trait PortScanner: Send + Sync {
    fn scan(&self) -> Result<Vec<PortInfo>, SourceError>;
}

/// Lists the ports the operating system reports.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPorts;

impl PortScanner for SystemPorts {
    fn scan(&self) -> Result<Vec<PortInfo>, SourceError> {
        let ports = serialport::available_ports()?
            .into_iter()
            .map(|p| match p.port_type {
                SerialPortType::UsbPort(usb) => PortInfo {
                    path: p.port_name,
                    vid: Some(usb.vid),
                    pid: Some(usb.pid),
                    manufacturer: usb.manufacturer,
                    product: usb.product,
                    serial_number: usb.serial_number,
                },
                _ => PortInfo::bare(p.port_name),
            })
            .collect();
        Ok(ports)
    }
}

/// A fixed list of ports, for replaying a known setup.
#[derive(Debug, Default, Clone)]
pub struct FixedPorts(pub Vec<PortInfo>);

impl PortScanner for FixedPorts {
    fn scan(&self) -> Result<Vec<PortInfo>, SourceError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usb(path: &str, vid: u16, pid: u16) -> PortInfo {
        PortInfo {
            vid: Some(vid),
            pid: Some(pid),
            ..PortInfo::bare(path)
        }
    }

    #[test]
    fn known_ids_match_anywhere() {
        for platform in [Platform::MacOs, Platform::Linux, Platform::Windows] {
            assert!(is_candidate(&usb("COM3", 0x2341, 0x0043), platform));
            assert!(is_candidate(&usb("COM4", 0x10C4, 0xEA60), platform));
        }
        assert!(!is_candidate(&usb("COM5", 0x0403, 0x6001), Platform::Windows));
    }

    #[test]
    fn description_match() {
        let port = PortInfo {
            manufacturer: Some("Arduino LLC (www.arduino.cc)".to_owned()),
            ..PortInfo::bare("COM7")
        };
        assert!(is_candidate(&port, Platform::Windows));

        let port = PortInfo {
            product: Some("ARDUINO Nano Every".to_owned()),
            ..PortInfo::bare("COM8")
        };
        assert!(is_candidate(&port, Platform::Windows));
    }

    #[test]
    fn path_prefixes_are_platform_specific() {
        let acm = PortInfo::bare("/dev/ttyACM0");
        let modem = PortInfo::bare("/dev/cu.usbmodem14101");
        assert!(is_candidate(&acm, Platform::Linux));
        assert!(!is_candidate(&acm, Platform::MacOs));
        assert!(is_candidate(&modem, Platform::MacOs));
        assert!(!is_candidate(&modem, Platform::Linux));
        assert!(!is_candidate(&PortInfo::bare("/dev/ttyS0"), Platform::Linux));
    }

    #[test]
    fn classification() {
        let acm = PortInfo::bare("/dev/ttyACM0");
        let usb0 = PortInfo::bare("/dev/ttyUSB0");
        let serial = PortInfo::bare("/dev/ttyS0");

        assert_eq!(classify(&[], Platform::Linux), PortMatch::NoMatch);
        assert_eq!(
            classify(&[serial.clone()], Platform::Linux),
            PortMatch::NoMatch
        );
        assert_eq!(
            classify(&[serial.clone(), acm.clone()], Platform::Linux),
            PortMatch::Single(acm.clone())
        );
        assert_eq!(
            classify(&[acm.clone(), serial, usb0.clone()], Platform::Linux),
            PortMatch::Ambiguous(vec![acm, usb0])
        );
    }

    #[test]
    fn report_format() {
        let report = usb("/dev/ttyACM0", 0x2341, 0x0043).to_string();
        assert!(report.contains("Device         : /dev/ttyACM0"));
        assert!(report.contains("VID:PID        : 2341:0043"));
        assert!(report.contains("Manufacturer   : N/A"));
    }
}
