use super::Serialize;
use byteorder::WriteBytesExt;
use std::io::Result;

/// Class file version, as `major.minor`
#[derive(PartialEq, Eq, Hash, Debug, Copy, Clone)]
pub struct Version {
    pub minor_version: u16,
    pub major_version: u16,
}

impl Version {
    /// Java SE 6, the last version where stack map frames are optional
    pub const JAVA6: Version = Version {
        minor_version: 0,
        major_version: 50,
    };

    /// Java SE 8
    pub const JAVA8: Version = Version {
        minor_version: 0,
        major_version: 52,
    };

    /// Java SE 11
    pub const JAVA11: Version = Version {
        minor_version: 0,
        major_version: 55,
    };

    /// Whether a `StackMapTable` is emitted when frames are computed
    ///
    /// Older verifiers ignore frames entirely.
    pub fn supports_frames(&self) -> bool {
        self.major_version >= Version::JAVA6.major_version
    }
}

impl Serialize for Version {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.minor_version.serialize(writer)?;
        self.major_version.serialize(writer)
    }
}
