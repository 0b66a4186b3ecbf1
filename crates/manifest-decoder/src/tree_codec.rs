use policy_engine::PolicyTree;
use sandbox_core::{ManifestDecodeError, PolicyFlags, Usn};

use crate::reader::{Reader, MAGIC_RECORD};

/// Decodes `ManifestRecord(root)`: a depth-first stream of
/// `{magic, atom, node_policy, cone_policy, usn?, bucket_count, child_count,
/// children...}`. The root record carries an empty atom implicitly (it is
/// never encoded) — the wire format starts directly at the root's policy
/// fields.
pub fn decode_tree(reader: &mut Reader<'_>) -> Result<PolicyTree, ManifestDecodeError> {
    reader.expect_magic(MAGIC_RECORD)?;
    let mut tree = PolicyTree::new();
    let (node_policy, cone_policy, usn, bucket_count) = read_record_fields(reader)?;
    tree.set_root_policy(node_policy, cone_policy, usn, bucket_count);
    let child_count = reader.read_u32()?;
    for _ in 0..child_count {
        decode_subtree(reader, &mut tree, 0)?;
    }
    Ok(tree)
}

fn decode_subtree(
    reader: &mut Reader<'_>,
    tree: &mut PolicyTree,
    parent: usize,
) -> Result<(), ManifestDecodeError> {
    reader.expect_magic(MAGIC_RECORD)?;
    let atom = reader.read_wide_string()?;
    if atom.is_empty() {
        return Err(ManifestDecodeError::MalformedTree(
            "non-root record has an empty path atom".to_string(),
        ));
    }
    let (node_policy, cone_policy, usn, bucket_count) = read_record_fields(reader)?;
    let index = tree.add_record(parent, atom, node_policy, cone_policy, usn, bucket_count);
    let child_count = reader.read_u32()?;
    for _ in 0..child_count {
        decode_subtree(reader, tree, index)?;
    }
    Ok(())
}

type RecordFields = (PolicyFlags, PolicyFlags, Option<Usn>, u32);

fn read_record_fields(reader: &mut Reader<'_>) -> Result<RecordFields, ManifestDecodeError> {
    let node_policy = PolicyFlags::from_bits_truncate(reader.read_u32()?);
    let cone_policy = PolicyFlags::from_bits_truncate(reader.read_u32()?);
    let has_usn = reader.read_u8()? != 0;
    let usn = if has_usn {
        Some(Usn(reader.read_u64()?))
    } else {
        None
    };
    let bucket_count = reader.read_u32()?;
    Ok((node_policy, cone_policy, usn, bucket_count))
}
