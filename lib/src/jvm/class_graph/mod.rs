//! Class hierarchy queries used while computing stack map frames
//!
//! Merging two object types at a control flow join requires knowing their closest common
//! superclass, which in turn requires knowing the superclass chain of both types. The
//! [`ClassHierarchy`] trait is the only thing the frame engine needs: it can be backed by an
//! in-memory [`ClassGraph`] or by a [`ClassPathHierarchy`] that reads class files on demand.

use super::{BinaryName, ClassAccessFlags, ClassReader, Error, Name};
use elsa::map::FrozenMap;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fmt::Debug;
use std::path::PathBuf;

mod java_classes;

/// Source of superclass and interface information for classes, by internal name
///
/// Unknown classes must be reported as [`Error::TypeNotPresent`].
pub trait ClassHierarchy {
    /// Superclass of a class (`None` only for `java/lang/Object`)
    fn super_class(&self, name: &str) -> Result<Option<String>, Error>;

    /// Is this type an interface?
    fn is_interface(&self, name: &str) -> Result<bool, Error>;
}

/// Tracks the relationships between classes/interfaces
///
/// Classes can be added through a shared reference, so a graph can keep growing while other
/// parts of the program hold on to classes already in it.
pub struct ClassGraph {
    classes: FrozenMap<String, Box<ClassData>>,
}

impl ClassGraph {
    /// New empty graph
    pub fn new() -> Self {
        ClassGraph {
            classes: FrozenMap::new(),
        }
    }

    /// New graph containing the standard `java.lang` types
    pub fn with_java_classes() -> Self {
        let graph = ClassGraph::new();
        java_classes::add_to_graph(&graph);
        graph
    }

    /// Add a new class to the class graph
    ///
    /// If a class by the same name is already present, the existing class is kept.
    pub fn add_class(&self, data: ClassData) -> &ClassData {
        let name = String::from(data.name.as_str());
        match self.classes.get(&name) {
            Some(existing) => existing,
            None => self.classes.insert(name, Box::new(data)),
        }
    }

    pub fn lookup_class(&self, name: &str) -> Option<&ClassData> {
        self.classes.get(name)
    }

    fn resolve(&self, name: &str) -> Result<&ClassData, Error> {
        self.lookup_class(name)
            .ok_or_else(|| Error::TypeNotPresent(String::from(name)))
    }
}

impl Default for ClassGraph {
    fn default() -> Self {
        ClassGraph::new()
    }
}

impl ClassHierarchy for ClassGraph {
    fn super_class(&self, name: &str) -> Result<Option<String>, Error> {
        let class = self.resolve(name)?;
        Ok(class
            .superclass
            .as_ref()
            .map(|superclass| String::from(superclass.as_str())))
    }

    fn is_interface(&self, name: &str) -> Result<bool, Error> {
        Ok(self.resolve(name)?.is_interface())
    }
}

pub struct ClassData {
    /// Name of the class
    pub name: BinaryName,

    /// Superclass is only ever missing for `java/lang/Object` itself
    pub superclass: Option<BinaryName>,

    /// Interfaces implemented (or super-interfaces)
    pub interfaces: Vec<BinaryName>,

    /// Access flags (only `INTERFACE` matters for the hierarchy)
    pub access_flags: ClassAccessFlags,
}

impl ClassData {
    pub fn new(
        name: BinaryName,
        superclass: BinaryName,
        access_flags: ClassAccessFlags,
    ) -> ClassData {
        ClassData {
            name,
            superclass: Some(superclass),
            interfaces: vec![],
            access_flags,
        }
    }

    /// Is this an interface?
    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }
}

impl PartialEq for ClassData {
    fn eq(&self, other: &ClassData) -> bool {
        self.name == other.name
    }
}

impl Eq for ClassData {}

impl Debug for ClassData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_str())
    }
}

/// Class hierarchy which falls back to reading class files from directories
///
/// Classes already in the graph are used as they are. Other classes are looked up as
/// `<dir>/<internal name>.class` in each directory of the class path, in order, and only their
/// header is decoded. Loaded classes are added to the graph, so each file is read at most once.
pub struct ClassPathHierarchy {
    graph: ClassGraph,
    class_path: Vec<PathBuf>,
}

impl ClassPathHierarchy {
    pub fn new(graph: ClassGraph, class_path: Vec<PathBuf>) -> Self {
        ClassPathHierarchy { graph, class_path }
    }

    /// Get a class, loading it from the class path if needed
    fn load(&self, name: &str) -> Result<&ClassData, Error> {
        if let Some(class) = self.graph.lookup_class(name) {
            return Ok(class);
        }

        for directory in &self.class_path {
            let path = directory.join(format!("{}.class", name));
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(Error::IoError(err)),
            };
            let reader = ClassReader::parse(&bytes)?;
            if reader.class_name()? != name {
                return Err(Error::MalformedClass(format!(
                    "{} defines {} instead of {}",
                    path.display(),
                    reader.class_name()?,
                    name
                )));
            }
            log::debug!("Loaded class '{}' from {}", name, path.display());

            let to_binary_name =
                |name: &str| BinaryName::from_string(String::from(name)).map_err(Error::InvalidName);
            let data = ClassData {
                name: to_binary_name(name)?,
                superclass: reader.super_name()?.map(to_binary_name).transpose()?,
                interfaces: reader
                    .interface_names()?
                    .into_iter()
                    .map(to_binary_name)
                    .collect::<Result<_, _>>()?,
                access_flags: reader.access_flags(),
            };
            return Ok(self.graph.add_class(data));
        }

        Err(Error::TypeNotPresent(String::from(name)))
    }
}

impl ClassHierarchy for ClassPathHierarchy {
    fn super_class(&self, name: &str) -> Result<Option<String>, Error> {
        Ok(self
            .load(name)?
            .superclass
            .as_ref()
            .map(|superclass| String::from(superclass.as_str())))
    }

    fn is_interface(&self, name: &str) -> Result<bool, Error> {
        Ok(self.load(name)?.is_interface())
    }
}

/// Closest common superclass computation, with a cache
///
/// The cache lives as long as this value (usually one class writer), so nothing is shared between
/// separate encoding sessions.
pub struct CommonSuperclass<'h> {
    hierarchy: &'h dyn ClassHierarchy,
    cache: HashMap<(String, String), String>,
}

impl<'h> CommonSuperclass<'h> {
    pub fn new(hierarchy: &'h dyn ClassHierarchy) -> Self {
        CommonSuperclass {
            hierarchy,
            cache: HashMap::new(),
        }
    }

    /// Find the closest superclass shared by two classes
    ///
    /// Interfaces have no useful common superclass, so any interface yields `java/lang/Object`.
    /// Both classes must be known to the hierarchy, even when one is `java/lang/Object`.
    pub fn common_super_class(&mut self, type1: &str, type2: &str) -> Result<String, Error> {
        let key = if type1 <= type2 {
            (String::from(type1), String::from(type2))
        } else {
            (String::from(type2), String::from(type1))
        };
        if let Some(common) = self.cache.get(&key) {
            return Ok(common.clone());
        }

        let common = self.compute(type1, type2)?;
        self.cache.insert(key, common.clone());
        Ok(common)
    }

    fn compute(&self, type1: &str, type2: &str) -> Result<String, Error> {
        let object = "java/lang/Object";
        let is_interface1 = self.hierarchy.is_interface(type1)?;
        let is_interface2 = self.hierarchy.is_interface(type2)?;
        if type1 == object || type2 == object || is_interface1 || is_interface2 {
            return Ok(String::from(object));
        }

        let mut ancestors1: HashSet<String> = HashSet::new();
        let mut next = Some(String::from(type1));
        while let Some(class) = next {
            next = self.hierarchy.super_class(&class)?;
            ancestors1.insert(class);
        }

        let mut next = Some(String::from(type2));
        while let Some(class) = next {
            if ancestors1.contains(&class) {
                return Ok(class);
            }
            next = self.hierarchy.super_class(&class)?;
        }

        Ok(String::from(object))
    }
}
