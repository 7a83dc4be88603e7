use std::borrow::Cow;
use std::fmt;

/// Name of a method or field
///
/// See <https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.2.2>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Name of a class or interface in internal form (`java/lang/Object`)
///
/// See <https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct BinaryName(Cow<'static, str>);

/// Validated name string
pub trait Name: Sized {
    /// Describe what is wrong with `name`, if anything
    fn check_valid(name: impl AsRef<str>) -> Result<(), String>;

    fn as_str(&self) -> &str;

    fn from_string(name: String) -> Result<Self, String>;
}

impl Name for UnqualifiedName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            return Err(String::from("empty method or field name"));
        }
        if name.contains(&['.', ';', '[', '/'][..]) {
            return Err(format!("'{}' contains one of '.', ';', '[', '/'", name));
        }
        let special = name == "<init>" || name == "<clinit>";
        if !special && name.contains(&['<', '>'][..]) {
            return Err(format!("'{}' contains an angle bracket", name));
        }
        Ok(())
    }

    fn as_str(&self) -> &str {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(UnqualifiedName(Cow::Owned(name)))
    }
}

impl Name for BinaryName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        let bad_segment = name
            .split('/')
            .any(|segment| segment.is_empty() || segment.contains(&['.', ';', '['][..]));
        if bad_segment {
            Err(format!("'{}' is not a class name in internal form", name))
        } else {
            Ok(())
        }
    }

    fn as_str(&self) -> &str {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(BinaryName(Cow::Owned(name)))
    }
}

impl fmt::Debug for UnqualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for BinaryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for BinaryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl UnqualifiedName {
    const fn name(value: &'static str) -> UnqualifiedName {
        UnqualifiedName(Cow::Borrowed(value))
    }

    pub const INIT: Self = Self::name("<init>");
}

impl BinaryName {
    const fn name(value: &'static str) -> BinaryName {
        BinaryName(Cow::Borrowed(value))
    }

    // Classes the standard hierarchy and the verifier refer to
    pub const ARITHMETICEXCEPTION: Self = Self::name("java/lang/ArithmeticException");
    pub const ARRAYINDEXOUTOFBOUNDSEXCEPTION: Self =
        Self::name("java/lang/ArrayIndexOutOfBoundsException");
    pub const ASSERTIONERROR: Self = Self::name("java/lang/AssertionError");
    pub const BOOLEAN: Self = Self::name("java/lang/Boolean");
    pub const BYTE: Self = Self::name("java/lang/Byte");
    pub const CHARACTER: Self = Self::name("java/lang/Character");
    pub const CHARSEQUENCE: Self = Self::name("java/lang/CharSequence");
    pub const CLASS: Self = Self::name("java/lang/Class");
    pub const CLASSCASTEXCEPTION: Self = Self::name("java/lang/ClassCastException");
    pub const CLONEABLE: Self = Self::name("java/lang/Cloneable");
    pub const COMPARABLE: Self = Self::name("java/lang/Comparable");
    pub const DOUBLE: Self = Self::name("java/lang/Double");
    pub const ERROR: Self = Self::name("java/lang/Error");
    pub const EXCEPTION: Self = Self::name("java/lang/Exception");
    pub const FLOAT: Self = Self::name("java/lang/Float");
    pub const ILLEGALARGUMENTEXCEPTION: Self = Self::name("java/lang/IllegalArgumentException");
    pub const ILLEGALSTATEEXCEPTION: Self = Self::name("java/lang/IllegalStateException");
    pub const INDEXOUTOFBOUNDSEXCEPTION: Self =
        Self::name("java/lang/IndexOutOfBoundsException");
    pub const INTEGER: Self = Self::name("java/lang/Integer");
    pub const ITERABLE: Self = Self::name("java/lang/Iterable");
    pub const LINKAGEERROR: Self = Self::name("java/lang/LinkageError");
    pub const LONG: Self = Self::name("java/lang/Long");
    pub const METHODHANDLE: Self = Self::name("java/lang/invoke/MethodHandle");
    pub const METHODTYPE: Self = Self::name("java/lang/invoke/MethodType");
    pub const NULLPOINTEREXCEPTION: Self = Self::name("java/lang/NullPointerException");
    pub const NUMBER: Self = Self::name("java/lang/Number");
    pub const OBJECT: Self = Self::name("java/lang/Object");
    pub const RUNNABLE: Self = Self::name("java/lang/Runnable");
    pub const RUNTIMEEXCEPTION: Self = Self::name("java/lang/RuntimeException");
    pub const SERIALIZABLE: Self = Self::name("java/io/Serializable");
    pub const SHORT: Self = Self::name("java/lang/Short");
    pub const STRING: Self = Self::name("java/lang/String");
    pub const STRINGINDEXOUTOFBOUNDSEXCEPTION: Self =
        Self::name("java/lang/StringIndexOutOfBoundsException");
    pub const THROWABLE: Self = Self::name("java/lang/Throwable");
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn binary_names() {
        assert!(BinaryName::check_valid("java/lang/Object").is_ok());
        assert!(BinaryName::check_valid("Foo$Bar").is_ok());
        assert!(BinaryName::check_valid("").is_err());
        assert!(BinaryName::check_valid("java//Object").is_err());
        assert!(BinaryName::check_valid("java.lang.Object").is_err());
        assert!(BinaryName::check_valid("[I").is_err());
    }

    #[test]
    fn unqualified_names() {
        assert!(UnqualifiedName::check_valid("<init>").is_ok());
        assert!(UnqualifiedName::check_valid("<clinit>").is_ok());
        assert!(UnqualifiedName::check_valid("").is_err());
        assert!(UnqualifiedName::check_valid("foo").is_ok());
        assert!(UnqualifiedName::check_valid("<foo>").is_err());
        assert!(UnqualifiedName::check_valid("a/b").is_err());
    }
}
