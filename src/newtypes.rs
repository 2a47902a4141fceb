//! Newtypes for table row ids and the two coordinate systems.

/// A node ID
///
/// This is an integer referring to a row of a
/// [`NodeTable`](crate::NodeTable).
///
/// # Examples
///
/// These examples illustrate using this type as something "integer-like".
///
/// ```
/// use coalsim::NodeId;
///
/// // The default value is null:
/// assert_eq!(NodeId::default(), NodeId::NULL);
///
/// let y: NodeId = NodeId::from(1);
/// assert_eq!(1, y);
/// assert_eq!(y, 1);
/// assert!(y < 2);
/// assert!(2 > y);
/// ```
///
/// The types also implement `Display`:
///
/// ```
/// use coalsim::NodeId;
///
/// let n = NodeId::from(11);
/// assert_eq!(format!("{}", n), "11".to_string());
/// // Debug output contains type info
/// assert_eq!(format!("{:?}", n), "NodeId(11)".to_string());
/// let n = NodeId::NULL;
/// assert_eq!(format!("{}", n), "NULL");
/// assert_eq!(format!("{:?}", n), "NodeId(-1)");
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, std::hash::Hash)]
pub struct NodeId(i32);

/// An individual ID
///
/// This is an integer referring to a row of an
/// [`IndividualTable`](crate::IndividualTable).
///
/// The features for this type follow the same pattern as for [`NodeId`].
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, std::hash::Hash)]
pub struct IndividualId(i32);

/// A population ID
///
/// This is an integer referring to a row of a
/// [`PopulationTable`](crate::PopulationTable).
///
/// The features for this type follow the same pattern as for [`NodeId`].
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, std::hash::Hash)]
pub struct PopulationId(i32);

/// A site ID
///
/// This is an integer referring to a row of a
/// [`SiteTable`](crate::SiteTable).
///
/// The features for this type follow the same pattern as for [`NodeId`].
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, std::hash::Hash)]
pub struct SiteId(i32);

/// A mutation ID
///
/// This is an integer referring to a row of a
/// [`MutationTable`](crate::MutationTable).
///
/// The features for this type follow the same pattern as for [`NodeId`].
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, std::hash::Hash)]
pub struct MutationId(i32);

/// A migration ID
///
/// This is an integer referring to a row of a
/// [`MigrationTable`](crate::MigrationTable).
///
/// The features for this type follow the same pattern as for [`NodeId`].
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, std::hash::Hash)]
pub struct MigrationId(i32);

/// An edge ID
///
/// This is an integer referring to a row of an
/// [`EdgeTable`](crate::EdgeTable).
///
/// The features for this type follow the same pattern as for [`NodeId`].
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, std::hash::Hash)]
pub struct EdgeId(i32);

/// A provenance ID
///
/// This is an integer referring to a row of a
/// [`ProvenanceTable`](crate::ProvenanceTable).
///
/// The features for this type follow the same pattern as for [`NodeId`].
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, std::hash::Hash)]
pub struct ProvenanceId(i32);

impl_id_traits!(NodeId);
impl_id_traits!(IndividualId);
impl_id_traits!(PopulationId);
impl_id_traits!(SiteId);
impl_id_traits!(MutationId);
impl_id_traits!(MigrationId);
impl_id_traits!(EdgeId);
impl_id_traits!(ProvenanceId);

/// A newtype for the concept of "genomic position".
/// A `Position` can represent either a locus or a
/// distance between loci.
///
/// Wraps [`f64`].
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
pub struct Position(f64);

/// A newtype for the concept of time.
/// A `Time` value can represent either a point in time
/// or the output of arithmetic involving time.
///
/// Wraps [`f64`].
///
/// # Examples
///
/// ```
/// let t0 = coalsim::Time::from(2.0);
/// let t1 = coalsim::Time::from(10.0);
/// let sum = t0 + t1;
///
/// match sum.partial_cmp(&12.0) {
///    Some(std::cmp::Ordering::Equal) => (),
///    _ => assert!(false),
/// };
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
pub struct Time(f64);

impl_f64_newtypes!(Position);
impl_f64_newtypes!(Time);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(non_snake_case)]
    fn test_f64_newtype_Display() {
        let x = Position::from(1.0);
        assert_eq!(format!("{}", x), "1".to_string());
        let t = Time::from(1.5);
        assert_eq!(format!("{}", t), "1.5".to_string());
    }

    #[test]
    fn test_from_reference() {
        let x = 2;
        let y = NodeId::from(x);
        assert_eq!(y, 2);
        assert_eq!(2, i32::from(&y));
    }

    #[test]
    fn test_null_is_default() {
        assert!(PopulationId::default().is_null());
        assert_eq!(IndividualId::NULL.raw(), -1);
        assert_eq!(NodeId::NULL.to_usize(), None);
    }

    #[test]
    fn test_usize_round_trip() {
        let y = NodeId::try_from(7_usize).unwrap();
        assert_eq!(usize::try_from(y).unwrap(), 7);
        assert!(usize::try_from(NodeId::NULL).is_err());
    }
}
