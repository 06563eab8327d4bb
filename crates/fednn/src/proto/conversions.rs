//! Conversions between protocol types and their protobuf messages.

use super::generated::{
    EncryptDistance as EncryptDistanceProto, QueryAnswer as QueryAnswerProto,
    QueryObject as QueryObjectProto,
};
use crate::dataset::VectorRecord;
use crate::he::EncryptedScalar;
use crate::silo::{PairComparison, Query};
use crate::Error;
use prost::Message;
use tonic::{Code, Status};

/// Encoded size of the protobuf message carrying a value.
pub trait WireSize {
    /// Size in bytes.
    fn wire_size(&self) -> usize;
}

impl WireSize for () {
    fn wire_size(&self) -> usize {
        0
    }
}

impl WireSize for Query {
    fn wire_size(&self) -> usize {
        QueryObjectProto::from(self).encoded_len()
    }
}

impl WireSize for EncryptedScalar {
    fn wire_size(&self) -> usize {
        EncryptDistanceProto::from(self).encoded_len()
    }
}

impl WireSize for PairComparison {
    fn wire_size(&self) -> usize {
        EncryptDistanceProto::from(self).encoded_len()
    }
}

impl WireSize for VectorRecord {
    fn wire_size(&self) -> usize {
        QueryAnswerProto::from(self).encoded_len()
    }
}

impl From<&Query> for QueryObjectProto {
    fn from(query: &Query) -> Self {
        QueryObjectProto {
            pk: query.public_key.clone(),
            data: query.values.clone(),
            ipaddr: query.peer_address.clone().unwrap_or_default(),
            position: query.position as u32,
        }
    }
}

impl From<QueryObjectProto> for Query {
    fn from(proto: QueryObjectProto) -> Self {
        Query {
            values: proto.data,
            public_key: proto.pk,
            peer_address: Some(proto.ipaddr).filter(|a| !a.is_empty()),
            position: proto.position as usize,
        }
    }
}

impl From<&EncryptedScalar> for EncryptDistanceProto {
    fn from(scalar: &EncryptedScalar) -> Self {
        EncryptDistanceProto {
            edist: scalar.as_bytes().to_vec(),
            comm: 0,
        }
    }
}

impl From<EncryptDistanceProto> for EncryptedScalar {
    fn from(proto: EncryptDistanceProto) -> Self {
        EncryptedScalar::from_bytes(proto.edist)
    }
}

impl From<&PairComparison> for EncryptDistanceProto {
    fn from(comparison: &PairComparison) -> Self {
        EncryptDistanceProto {
            edist: comparison.delta.as_bytes().to_vec(),
            comm: comparison.peer_communication,
        }
    }
}

impl From<EncryptDistanceProto> for PairComparison {
    fn from(proto: EncryptDistanceProto) -> Self {
        PairComparison {
            delta: EncryptedScalar::from_bytes(proto.edist),
            peer_communication: proto.comm,
        }
    }
}

impl From<&VectorRecord> for QueryAnswerProto {
    fn from(record: &VectorRecord) -> Self {
        QueryAnswerProto {
            vid: record.id,
            data: record.values.clone(),
        }
    }
}

impl From<QueryAnswerProto> for VectorRecord {
    fn from(proto: QueryAnswerProto) -> Self {
        VectorRecord::new(proto.vid, proto.data)
    }
}

impl From<Error> for Status {
    fn from(error: Error) -> Self {
        match error {
            Error::Configuration(m) => Status::invalid_argument(m),
            Error::ParameterMismatch(m) => Status::failed_precondition(m),
            Error::ProtocolViolation(m) => Status::aborted(m),
            Error::Transport(m) => Status::unavailable(m),
            Error::Encryption(e) => Status::internal(e.to_string()),
            Error::Io(e) => Status::unavailable(e.to_string()),
        }
    }
}

/// Rebuilds the error raised by the remote party from its status code.
/// Failures of the remote encryption library cannot be rebuilt as such and
/// surface as transport errors.
impl From<Status> for Error {
    fn from(status: Status) -> Self {
        let message = status.message().to_string();
        match status.code() {
            Code::InvalidArgument => Error::Configuration(message),
            Code::FailedPrecondition => Error::ParameterMismatch(message),
            Code::Aborted => Error::ProtocolViolation(message),
            Code::Unavailable => Error::Transport(message),
            Code::Internal => Error::Transport(format!("Remote encryption failure: {message}")),
            code => Error::Transport(format!("Remote failure ({code:?}): {message}")),
        }
    }
}
