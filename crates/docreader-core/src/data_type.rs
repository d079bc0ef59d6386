// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data item registry: every tag the engine can return, with its payload shape.
//
// Two namespaces share one integer space. Scalar tags run contiguously from
// zero in vendor declaration order; plugin-decoded features start at
// `CD_PLUGIN` and are addressed by feature id.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ReaderError;

/// Base of the plugin namespace.
pub const CD_PLUGIN: i32 = 0x1000_0000;

/// Number of scalar tags (one past the last scalar discriminant).
pub const NUM_MMMR_DATATYPES: i32 = 211;

/// Longest codeline the engine produces, excluding the terminating NUL.
pub const MAX_CODELINE_LEN: usize = 200;

/// How the bytes behind a tag are to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PayloadShape {
    /// NUL-terminated narrow string.
    Text,
    /// NUL-terminated ASCII codeline, up to three lines separated by 0x0D.
    Codeline,
    /// Little-endian 32-bit integer.
    Int32,
    /// Little-endian 32-bit integer: 0 not checked, >0 ok, -1 error, < -1 warning.
    Checksum,
    /// Little-endian 32-bit float.
    Float32,
    TriState,
    Validation,
    /// Document detection progress.
    Detection,
    /// Raw file or certificate bytes, passed through untouched.
    Bytes,
    /// Encoded image (BMP/JPEG/JPEG 2000 depending on settings).
    Image,
    /// NUL-terminated JSON text.
    Json,
    /// A vendor struct the client keeps opaque; the name is the C type.
    Struct(&'static str),
    /// Packed health-certificate struct.
    GreenCertificate,
    /// Writable MRZ buffer handed out for BAC key correction.
    WritableText,
    /// Plugin record; only reachable through the plugin accessor.
    Plugin,
}

impl PayloadShape {
    /// Exact payload size for fixed-size shapes.
    pub fn fixed_len(self) -> Option<usize> {
        match self {
            PayloadShape::Int32
            | PayloadShape::Checksum
            | PayloadShape::Float32
            | PayloadShape::TriState
            | PayloadShape::Validation
            | PayloadShape::Detection => Some(4),
            PayloadShape::GreenCertificate => Some(crate::dgc::GREEN_CERTIFICATE_LEN),
            _ => None,
        }
    }

    /// Upper bound on payload size including the terminating NUL, if documented.
    pub fn max_len(self) -> Option<usize> {
        match self {
            PayloadShape::Codeline => Some(MAX_CODELINE_LEN + 1),
            other => other.fixed_len(),
        }
    }

    pub fn is_textual(self) -> bool {
        matches!(
            self,
            PayloadShape::Text
                | PayloadShape::Codeline
                | PayloadShape::Json
                | PayloadShape::WritableText
        )
    }
}

macro_rules! data_types {
    ($($variant:ident = $raw:literal => $vendor:literal, $shape:ident $(($sname:literal))?;)+) => {
        /// A scalar data item tag. Discriminants are the engine's integers.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[repr(i32)]
        pub enum DataType {
            $($variant = $raw,)+
        }

        impl DataType {
            /// Every scalar tag in declaration order.
            pub const ALL: &'static [DataType] = &[$(DataType::$variant,)+];

            pub const fn raw(self) -> i32 {
                self as i32
            }

            pub fn from_raw(raw: i32) -> Option<Self> {
                match raw {
                    $($raw => Some(DataType::$variant),)+
                    _ => None,
                }
            }

            /// Vendor constant name, e.g. `CD_CODELINE`.
            pub const fn vendor_name(self) -> &'static str {
                match self {
                    $(DataType::$variant => $vendor,)+
                }
            }

            pub const fn shape(self) -> PayloadShape {
                match self {
                    $(DataType::$variant => PayloadShape::$shape $(($sname))?,)+
                }
            }
        }
    };
}

data_types! {
        Codeline = 0 => "CD_CODELINE", Codeline;
        CodelineData = 1 => "CD_CODELINE_DATA", Struct("MMMReaderCodelineData");
        Checksum = 2 => "CD_CHECKSUM", Checksum;
        ChecksumExtended = 3 => "CD_CHECKSUMEXTENDED", Int32;
        ImageIr = 4 => "CD_IMAGEIR", Image;
        ImageIrRear = 5 => "CD_IMAGEIRREAR", Image;
        ImageVis = 6 => "CD_IMAGEVIS", Image;
        ImageVisRear = 7 => "CD_IMAGEVISREAR", Image;
        ImageVisOvd1 = 8 => "CD_IMAGEVIS_OVD1", Image;
        ImageVisOvd2 = 9 => "CD_IMAGEVIS_OVD2", Image;
        ImagePhoto = 10 => "CD_IMAGEPHOTO", Image;
        ImageUv = 11 => "CD_IMAGEUV", Image;
        ImageUvRear = 12 => "CD_IMAGEUVREAR", Image;
        ImageCoaxVis = 13 => "CD_IMAGECOAXVIS", Image;
        ImageCoaxIr = 14 => "CD_IMAGECOAXIR", Image;
        ImageBarcode = 15 => "CD_IMAGEBARCODE", Image;
        ImageBarcodeRear = 16 => "CD_IMAGEBARCODEREAR", Image;
        SecurityCheck = 17 => "CD_SECURITYCHECK", Int32;
        ScDg1Codeline = 18 => "CD_SCDG1_CODELINE", Codeline;
        ScDg1CodelineData = 19 => "CD_SCDG1_CODELINE_DATA", Struct("MMMReaderCodelineData");
        ScDg2Photo = 20 => "CD_SCDG2_PHOTO", Image;
        ScDg3Fingerprints = 21 => "CD_SCDG3_FINGERPRINTS", Struct("DG3FingerprintData");
        ScDg1Validate = 22 => "CD_SCDG1_VALIDATE", Validation;
        ScDg2Validate = 23 => "CD_SCDG2_VALIDATE", Validation;
        ScDg3Validate = 24 => "CD_SCDG3_VALIDATE", Validation;
        ScDg4Validate = 25 => "CD_SCDG4_VALIDATE", Validation;
        ScDg5Validate = 26 => "CD_SCDG5_VALIDATE", Validation;
        ScDg6Validate = 27 => "CD_SCDG6_VALIDATE", Validation;
        ScDg7Validate = 28 => "CD_SCDG7_VALIDATE", Validation;
        ScDg8Validate = 29 => "CD_SCDG8_VALIDATE", Validation;
        ScDg9Validate = 30 => "CD_SCDG9_VALIDATE", Validation;
        ScDg10Validate = 31 => "CD_SCDG10_VALIDATE", Validation;
        ScDg11Validate = 32 => "CD_SCDG11_VALIDATE", Validation;
        ScDg12Validate = 33 => "CD_SCDG12_VALIDATE", Validation;
        ScDg13Validate = 34 => "CD_SCDG13_VALIDATE", Validation;
        ScDg14Validate = 35 => "CD_SCDG14_VALIDATE", Validation;
        ScDg15Validate = 36 => "CD_SCDG15_VALIDATE", Validation;
        ScDg16Validate = 37 => "CD_SCDG16_VALIDATE", Validation;
        ScSignedAttrsValidate = 38 => "CD_SCSIGNEDATTRS_VALIDATE", Validation;
        ScSignatureValidate = 39 => "CD_SCSIGNATURE_VALIDATE", Validation;
        ScAirBaud = 40 => "CD_SCAIRBAUD", Text;
        ScChipId = 41 => "CD_SCCHIPID", Text;
        ScEfComFile = 42 => "CD_SCEF_COM_FILE", Bytes;
        ScEfSodFile = 43 => "CD_SCEF_SOD_FILE", Bytes;
        ScDg1File = 44 => "CD_SCDG1_FILE", Bytes;
        ScDg2File = 45 => "CD_SCDG2_FILE", Bytes;
        ScDg3File = 46 => "CD_SCDG3_FILE", Bytes;
        ScDg4File = 47 => "CD_SCDG4_FILE", Bytes;
        ScDg5File = 48 => "CD_SCDG5_FILE", Bytes;
        ScDg6File = 49 => "CD_SCDG6_FILE", Bytes;
        ScDg7File = 50 => "CD_SCDG7_FILE", Bytes;
        ScDg8File = 51 => "CD_SCDG8_FILE", Bytes;
        ScDg9File = 52 => "CD_SCDG9_FILE", Bytes;
        ScDg10File = 53 => "CD_SCDG10_FILE", Bytes;
        ScDg11File = 54 => "CD_SCDG11_FILE", Bytes;
        ScDg12File = 55 => "CD_SCDG12_FILE", Bytes;
        ScDg13File = 56 => "CD_SCDG13_FILE", Bytes;
        ScDg14File = 57 => "CD_SCDG14_FILE", Bytes;
        ScDg15File = 58 => "CD_SCDG15_FILE", Bytes;
        ScDg16File = 59 => "CD_SCDG16_FILE", Bytes;
        ScEfCvcaFile = 60 => "CD_SCEF_CVCA_FILE", Bytes;
        ScBacStatus = 61 => "CD_SCBAC_STATUS", TriState;
        BacKeyCorrection = 62 => "CD_BACKEY_CORRECTION", WritableText;
        ActiveAuthentication = 63 => "CD_ACTIVE_AUTHENTICATION", TriState;
        ValidateDocSignerCert = 64 => "CD_VALIDATE_DOC_SIGNER_CERT", Validation;
        ScTerminalAuthenticationStatus = 65 => "CD_SCTERMINAL_AUTHENTICATION_STATUS", TriState;
        ScChipAuthenticationStatus = 66 => "CD_SCCHIP_AUTHENTICATION_STATUS", TriState;
        ScCrossCheckEfComEfSod = 67 => "CD_SCCROSSCHECK_EFCOM_EFSOD", TriState;
        PassiveAuthentication = 68 => "CD_PASSIVE_AUTHENTICATION", Validation;
        SacStatus = 69 => "CD_SAC_STATUS", TriState;
        ScEfCardAccessFile = 70 => "CD_SCEF_CARD_ACCESS_FILE", Bytes;
        EfComDgMap = 71 => "CD_EFCOM_DG_MAP", Bytes;
        EfSodHashMap = 72 => "CD_EFSOD_HASH_MAP", Bytes;
        DocSignerCert = 73 => "CD_DOC_SIGNER_CERT", Bytes;
        SwipeMsrData = 74 => "CD_SWIPE_MSR_DATA", Struct("MMMReaderMsrData");
        AamvaData = 75 => "CD_AAMVA_DATA", Struct("MMMReaderAAMVAData");
        QaInfo = 76 => "CD_QAINFO", Bytes;
        UhfTagId = 77 => "CD_UHF_TAGID", Struct("MMMReaderUHFTagIDData");
        UhfEpc = 78 => "CD_UHF_EPC", Bytes;
        UhfMemory = 79 => "CD_UHF_MEMORY", Struct("MMMReaderUHFTagMemoryData");
        SwipeAamvaData = 80 => "CD_SWIPE_AAMVA_DATA", Struct("MMMReaderAAMVAData");
        ReadProgress = 81 => "CD_READ_PROGRESS", Float32;
        Inspection = 82 => "CD_INSPECTION", Bytes;
        IdentifiedResult = 83 => "CD_IDENTIFIED_RESULT", Struct("MMMReaderIdentifyResult");
        CompletionResult = 84 => "CD_COMPLETION_RESULT", Struct("MMMReaderCompletionResult");
        ProcessResultGeneral = 85 => "CD_PROCESS_RESULT_GENERAL", Struct("MMMReaderProcessResultGeneral");
        ProcessResultIcaoMrz = 86 => "CD_PROCESS_RESULT_ICAOMRZ", Struct("MMMReaderProcessResultIcaoMrz");
        ProcessResultIcaoMrzQa = 87 => "CD_PROCESS_RESULT_ICAOMRZQA", Struct("MMMReaderProcessResultIcaoMrzQA");
        ProcessResultTextCompare = 88 => "CD_PROCESS_RESULT_TEXT_COMPARE", Struct("MMMReaderProcessResultTextCompare");
        ProcessResultTextZone = 89 => "CD_PROCESS_RESULT_TEXT_ZONE", Struct("MMMReaderProcessResultTextZone");
        ProcessResultImageCompare = 90 => "CD_PROCESS_RESULT_IMAGE_COMPARE", Struct("MMMReaderProcessResultImageCompare");
        ProcessResultImageZone = 91 => "CD_PROCESS_RESULT_IMAGE_ZONE", Struct("MMMReaderProcessResultImageZone");
        ProcessResultBarcode = 92 => "CD_PROCESS_RESULT_BARCODE", Struct("MMMReaderProcessResultBarcode");
        ProcessResultMag = 93 => "CD_PROCESS_RESULT_MAG", Struct("MMMReaderProcessResultMagData");
        ProcessResultRf = 94 => "CD_PROCESS_RESULT_RF", Struct("MMMReaderProcessResultRF");
        VerifierResult = 95 => "CD_VERIFIER_RESULT", Struct("MMMReaderVerifierResult");
        ImagePhotoData = 96 => "CD_IMAGEPHOTODATA", Struct("MMMReaderPhotoData");
        ScDg1EidDocumentType = 97 => "CD_SCDG1_EID_DOCUMENT_TYPE", Text;
        ScDg2EidIssuingEntity = 98 => "CD_SCDG2_EID_ISSUING_ENTITY", Text;
        ScDg3EidValidityPeriod = 99 => "CD_SCDG3_EID_VALIDITY_PERIOD", Text;
        ScDg4EidGivenNames = 100 => "CD_SCDG4_EID_GIVEN_NAMES", Text;
        ScDg5EidFamilyNames = 101 => "CD_SCDG5_EID_FAMILY_NAMES", Text;
        ScDg6EidNomDePlume = 102 => "CD_SCDG6_EID_NOM_DE_PLUME", Text;
        ScDg7EidAcademicTitle = 103 => "CD_SCDG7_EID_ACADEMIC_TITLE", Text;
        ScDg8EidDateOfBirth = 104 => "CD_SCDG8_EID_DATE_OF_BIRTH", Text;
        ScDg9EidPlaceOfBirth = 105 => "CD_SCDG9_EID_PLACE_OF_BIRTH", Text;
        ScDg10EidNationality = 106 => "CD_SCDG10_EID_NATIONALITY", Text;
        ScDg11EidSex = 107 => "CD_SCDG11_EID_SEX", Text;
        ScDg12EidOptionalDataR = 108 => "CD_SCDG12_EID_OPTIONAL_DATA_R", Text;
        ScDg13EidBirthName = 109 => "CD_SCDG13_EID_BIRTH_NAME", Text;
        ScDg14EidWrittenSignature = 110 => "CD_SCDG14_EID_WRITTEN_SIGNATURE", Bytes;
        ScDg17EidPlaceOfResidence = 111 => "CD_SCDG17_EID_PLACE_OF_RESIDENCE", Text;
        ScDg18EidMunicipalityId = 112 => "CD_SCDG18_EID_MUNICIPALITY_ID", Text;
        ScDg19EidResidencePermit1 = 113 => "CD_SCDG19_EID_RESIDENCE_PERMIT_1", Text;
        ScDg20EidResidencePermit2 = 114 => "CD_SCDG20_EID_RESIDENCE_PERMIT_2", Text;
        ScDg21EidOptionalDataRw = 115 => "CD_SCDG21_EID_OPTIONAL_DATA_RW", Text;
        ScDg1ValidateEid = 116 => "CD_SCDG1_VALIDATE_EID", Validation;
        ScDg2ValidateEid = 117 => "CD_SCDG2_VALIDATE_EID", Validation;
        ScDg3ValidateEid = 118 => "CD_SCDG3_VALIDATE_EID", Validation;
        ScDg4ValidateEid = 119 => "CD_SCDG4_VALIDATE_EID", Validation;
        ScDg5ValidateEid = 120 => "CD_SCDG5_VALIDATE_EID", Validation;
        ScDg6ValidateEid = 121 => "CD_SCDG6_VALIDATE_EID", Validation;
        ScDg7ValidateEid = 122 => "CD_SCDG7_VALIDATE_EID", Validation;
        ScDg8ValidateEid = 123 => "CD_SCDG8_VALIDATE_EID", Validation;
        ScDg9ValidateEid = 124 => "CD_SCDG9_VALIDATE_EID", Validation;
        ScDg10ValidateEid = 125 => "CD_SCDG10_VALIDATE_EID", Validation;
        ScDg11ValidateEid = 126 => "CD_SCDG11_VALIDATE_EID", Validation;
        ScDg12ValidateEid = 127 => "CD_SCDG12_VALIDATE_EID", Validation;
        ScDg13ValidateEid = 128 => "CD_SCDG13_VALIDATE_EID", Validation;
        ScDg14ValidateEid = 129 => "CD_SCDG14_VALIDATE_EID", Validation;
        ScDg15ValidateEid = 130 => "CD_SCDG15_VALIDATE_EID", Validation;
        ScDg16ValidateEid = 131 => "CD_SCDG16_VALIDATE_EID", Validation;
        ScDg17ValidateEid = 132 => "CD_SCDG17_VALIDATE_EID", Validation;
        ScDg18ValidateEid = 133 => "CD_SCDG18_VALIDATE_EID", Validation;
        ScDg19ValidateEid = 134 => "CD_SCDG19_VALIDATE_EID", Validation;
        ScDg20ValidateEid = 135 => "CD_SCDG20_VALIDATE_EID", Validation;
        ScDg21ValidateEid = 136 => "CD_SCDG21_VALIDATE_EID", Validation;
        ScDg22ValidateEid = 137 => "CD_SCDG22_VALIDATE_EID", Validation;
        ScSignedAttrsValidateCardSecurityFile = 138 => "CD_SCSIGNEDATTRS_VALIDATE_CARD_SECURITY_FILE", Validation;
        ScSignedAttrsValidateChipSecurityFile = 139 => "CD_SCSIGNEDATTRS_VALIDATE_CHIP_SECURITY_FILE", Validation;
        ScSignatureValidateCardSecurityFile = 140 => "CD_SCSIGNATURE_VALIDATE_CARD_SECURITY_FILE", Validation;
        ScSignatureValidateChipSecurityFile = 141 => "CD_SCSIGNATURE_VALIDATE_CHIP_SECURITY_FILE", Validation;
        ScDg1FileEid = 142 => "CD_SCDG1_FILE_EID", Bytes;
        ScDg2FileEid = 143 => "CD_SCDG2_FILE_EID", Bytes;
        ScDg3FileEid = 144 => "CD_SCDG3_FILE_EID", Bytes;
        ScDg4FileEid = 145 => "CD_SCDG4_FILE_EID", Bytes;
        ScDg5FileEid = 146 => "CD_SCDG5_FILE_EID", Bytes;
        ScDg6FileEid = 147 => "CD_SCDG6_FILE_EID", Bytes;
        ScDg7FileEid = 148 => "CD_SCDG7_FILE_EID", Bytes;
        ScDg8FileEid = 149 => "CD_SCDG8_FILE_EID", Bytes;
        ScDg9FileEid = 150 => "CD_SCDG9_FILE_EID", Bytes;
        ScDg10FileEid = 151 => "CD_SCDG10_FILE_EID", Bytes;
        ScDg11FileEid = 152 => "CD_SCDG11_FILE_EID", Bytes;
        ScDg12FileEid = 153 => "CD_SCDG12_FILE_EID", Bytes;
        ScDg13FileEid = 154 => "CD_SCDG13_FILE_EID", Bytes;
        ScDg14FileEid = 155 => "CD_SCDG14_FILE_EID", Bytes;
        ScDg15FileEid = 156 => "CD_SCDG15_FILE_EID", Bytes;
        ScDg16FileEid = 157 => "CD_SCDG16_FILE_EID", Bytes;
        ScDg17FileEid = 158 => "CD_SCDG17_FILE_EID", Bytes;
        ScDg18FileEid = 159 => "CD_SCDG18_FILE_EID", Bytes;
        ScDg19FileEid = 160 => "CD_SCDG19_FILE_EID", Bytes;
        ScDg20FileEid = 161 => "CD_SCDG20_FILE_EID", Bytes;
        ScDg21FileEid = 162 => "CD_SCDG21_FILE_EID", Bytes;
        ScDg22FileEid = 163 => "CD_SCDG22_FILE_EID", Bytes;
        ValidateDocSignerCertCardSecurityFile = 164 => "CD_VALIDATE_DOC_SIGNER_CERT_CARD_SECURITY_FILE", Validation;
        ValidateDocSignerCertChipSecurityFile = 165 => "CD_VALIDATE_DOC_SIGNER_CERT_CHIP_SECURITY_FILE", Validation;
        ScEfChipSecurityFile = 166 => "CD_SCEF_CHIP_SECURITY_FILE", Bytes;
        ScEfCardSecurityFile = 167 => "CD_SCEF_CARD_SECURITY_FILE", Bytes;
        ScDg1FileEdl = 168 => "CD_SCDG1_FILE_EDL", Bytes;
        ScDg2FileEdl = 169 => "CD_SCDG2_FILE_EDL", Bytes;
        ScDg3FileEdl = 170 => "CD_SCDG3_FILE_EDL", Bytes;
        ScDg4FileEdl = 171 => "CD_SCDG4_FILE_EDL", Bytes;
        ScDg5FileEdl = 172 => "CD_SCDG5_FILE_EDL", Bytes;
        ScDg6FileEdl = 173 => "CD_SCDG6_FILE_EDL", Bytes;
        ScDg7FileEdl = 174 => "CD_SCDG7_FILE_EDL", Bytes;
        ScDg8FileEdl = 175 => "CD_SCDG8_FILE_EDL", Bytes;
        ScDg9FileEdl = 176 => "CD_SCDG9_FILE_EDL", Bytes;
        ScDg10FileEdl = 177 => "CD_SCDG10_FILE_EDL", Bytes;
        ScDg11FileEdl = 178 => "CD_SCDG11_FILE_EDL", Bytes;
        ScDg12FileEdl = 179 => "CD_SCDG12_FILE_EDL", Bytes;
        ScDg13FileEdl = 180 => "CD_SCDG13_FILE_EDL", Bytes;
        ScDg14FileEdl = 181 => "CD_SCDG14_FILE_EDL", Bytes;
        ScDg1ValidateEdl = 182 => "CD_SCDG1_VALIDATE_EDL", Validation;
        ScDg2ValidateEdl = 183 => "CD_SCDG2_VALIDATE_EDL", Validation;
        ScDg3ValidateEdl = 184 => "CD_SCDG3_VALIDATE_EDL", Validation;
        ScDg4ValidateEdl = 185 => "CD_SCDG4_VALIDATE_EDL", Validation;
        ScDg5ValidateEdl = 186 => "CD_SCDG5_VALIDATE_EDL", Validation;
        ScDg6ValidateEdl = 187 => "CD_SCDG6_VALIDATE_EDL", Validation;
        ScDg7ValidateEdl = 188 => "CD_SCDG7_VALIDATE_EDL", Validation;
        ScDg8ValidateEdl = 189 => "CD_SCDG8_VALIDATE_EDL", Validation;
        ScDg9ValidateEdl = 190 => "CD_SCDG9_VALIDATE_EDL", Validation;
        ScDg10ValidateEdl = 191 => "CD_SCDG10_VALIDATE_EDL", Validation;
        ScDg11ValidateEdl = 192 => "CD_SCDG11_VALIDATE_EDL", Validation;
        ScDg12ValidateEdl = 193 => "CD_SCDG12_VALIDATE_EDL", Validation;
        ScDg13ValidateEdl = 194 => "CD_SCDG13_VALIDATE_EDL", Validation;
        ScDg14ValidateEdl = 195 => "CD_SCDG14_VALIDATE_EDL", Validation;
        ScDg1EdlData = 196 => "CD_SCDG1_EDL_DATA", Struct("eDLDataGroup1Data");
        ScDg6EdlPhoto = 197 => "CD_SCDG6_EDL_PHOTO", Image;
        ScDg7EdlFingerprints = 198 => "CD_SCDG7_EDL_FINGERPRINTS", Struct("DG3FingerprintData");
        DatapageToChipMrzComparison = 199 => "CD_DATAPAGE_TO_CHIP_MRZ_COMPARISON", TriState;
        DatapageToChipFaceComparison = 200 => "CD_DATAPAGE_TO_CHIP_FACE_COMPARISON", TriState;
        DetectProgress = 201 => "CD_DETECT_PROGRESS", Detection;
        DataCaptureLite = 202 => "CD_DATA_CAPTURE_LITE", Struct("LiteDataCapture");
        DataCaptureLiteQaOcr = 203 => "CD_DATA_CAPTURE_LITE_QAOCR", Struct("QaCodelineMeasurements");
        IdvRemoteDocumentVerification = 204 => "CD_IDV_REMOTE_DOCUMENT_VERIFICATION", Json;
        IdvRemoteChipVerification = 205 => "CD_IDV_REMOTE_CHIP_VERIFICATION", Json;
        IdvRemoteFaceMatch = 206 => "CD_IDV_REMOTE_FACE_MATCH", Json;
        TextDataExtracted = 207 => "CD_TEXT_DATA_EXTRACTED", Struct("TextDataExtracted");
        DigitalGreenCertificate = 208 => "CD_DIGITAL_GREEN_CERTIFICATE", GreenCertificate;
        DgcSignatureValidate = 209 => "CD_DGC_SIGNATURE_VALIDATE", Validation;
        DgcDocSignerCertValidate = 210 => "CD_DGC_DOC_SIGNER_CERT_VALIDATE", Validation;
}

impl DataType {
    /// Old name kept by the vendor for source compatibility.
    pub const CD_IMAGERESERVED1: DataType = DataType::ImageCoaxVis;
    /// Old name kept by the vendor for source compatibility.
    pub const CD_IMAGERESERVED2: DataType = DataType::ImageCoaxIr;

    /// Look a tag up by vendor name. The retired aliases are accepted.
    pub fn from_vendor_name(name: &str) -> Option<Self> {
        match name {
            "CD_IMAGERESERVED1" => Some(Self::CD_IMAGERESERVED1),
            "CD_IMAGERESERVED2" => Some(Self::CD_IMAGERESERVED2),
            _ => DataType::ALL
                .iter()
                .copied()
                .find(|t| t.vendor_name() == name),
        }
    }

    /// Items produced by the RFID chip read. The engine holds these back while a
    /// BAC key correction is outstanding.
    pub fn is_rfid(self) -> bool {
        let name = self.vendor_name();
        name.starts_with("CD_SC")
            || name.starts_with("CD_EF")
            || name.starts_with("CD_DATAPAGE_TO_CHIP")
            || matches!(
                self,
                DataType::ActiveAuthentication
                    | DataType::ValidateDocSignerCert
                    | DataType::PassiveAuthentication
                    | DataType::SacStatus
                    | DataType::DocSignerCert
                    | DataType::ValidateDocSignerCertCardSecurityFile
                    | DataType::ValidateDocSignerCertChipSecurityFile
            )
    }

    pub fn is_image(self) -> bool {
        self.shape() == PayloadShape::Image
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.vendor_name())
    }
}

/// Feature id of a plugin-decoded item (`tag - CD_PLUGIN`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PluginFeature {
    Industrial2Of5,
    Interleaved2Of5,
    Iata2Of5,
    Code39,
    Code128,
    Pdf417,
    Cheques,
    UkDrivingLicence,
    ChnVisas,
    AztecCode,
    UsVisas,
    QrCode,
    Code93,
    Codabar,
    OcrToolkit,
    UpcEan,
    DataMatrix,
    /// A feature id the client has no name for. Plugins are loaded at runtime,
    /// so this is normal.
    Other(i32),
}

impl PluginFeature {
    pub const KNOWN: &'static [PluginFeature] = &[
        PluginFeature::Industrial2Of5,
        PluginFeature::Interleaved2Of5,
        PluginFeature::Iata2Of5,
        PluginFeature::Code39,
        PluginFeature::Code128,
        PluginFeature::Pdf417,
        PluginFeature::Cheques,
        PluginFeature::UkDrivingLicence,
        PluginFeature::ChnVisas,
        PluginFeature::AztecCode,
        PluginFeature::UsVisas,
        PluginFeature::QrCode,
        PluginFeature::Code93,
        PluginFeature::Codabar,
        PluginFeature::OcrToolkit,
        PluginFeature::UpcEan,
        PluginFeature::DataMatrix,
    ];

    pub fn from_feature_id(id: i32) -> Self {
        match id {
            1 => PluginFeature::Industrial2Of5,
            2 => PluginFeature::Interleaved2Of5,
            3 => PluginFeature::Iata2Of5,
            4 => PluginFeature::Code39,
            5 => PluginFeature::Code128,
            6 => PluginFeature::Pdf417,
            7 => PluginFeature::Cheques,
            8 => PluginFeature::UkDrivingLicence,
            9 => PluginFeature::ChnVisas,
            10 => PluginFeature::AztecCode,
            11 => PluginFeature::UsVisas,
            12 => PluginFeature::QrCode,
            13 => PluginFeature::Code93,
            14 => PluginFeature::Codabar,
            15 => PluginFeature::OcrToolkit,
            16 => PluginFeature::UpcEan,
            20 => PluginFeature::DataMatrix,
            other => PluginFeature::Other(other),
        }
    }

    pub fn feature_id(self) -> i32 {
        match self {
            PluginFeature::Industrial2Of5 => 1,
            PluginFeature::Interleaved2Of5 => 2,
            PluginFeature::Iata2Of5 => 3,
            PluginFeature::Code39 => 4,
            PluginFeature::Code128 => 5,
            PluginFeature::Pdf417 => 6,
            PluginFeature::Cheques => 7,
            PluginFeature::UkDrivingLicence => 8,
            PluginFeature::ChnVisas => 9,
            PluginFeature::AztecCode => 10,
            PluginFeature::UsVisas => 11,
            PluginFeature::QrCode => 12,
            PluginFeature::Code93 => 13,
            PluginFeature::Codabar => 14,
            PluginFeature::OcrToolkit => 15,
            PluginFeature::UpcEan => 16,
            PluginFeature::DataMatrix => 20,
            PluginFeature::Other(id) => id,
        }
    }

    pub fn vendor_name(self) -> Option<&'static str> {
        Some(match self {
            PluginFeature::Industrial2Of5 => "CD_BARCODE_1D_INDUSTRIAL_2_OF_5",
            PluginFeature::Interleaved2Of5 => "CD_BARCODE_1D_INTERLEAVED_2_OF_5",
            PluginFeature::Iata2Of5 => "CD_BARCODE_1D_IATA_2_OF_5",
            PluginFeature::Code39 => "CD_BARCODE_1D_3_OF_9",
            PluginFeature::Code128 => "CD_BARCODE_1D_128",
            PluginFeature::Pdf417 => "CD_BARCODE_PDF417",
            PluginFeature::Cheques => "CD_CHEQUES",
            PluginFeature::UkDrivingLicence => "CD_UK_DRIVING_LICENCE",
            PluginFeature::ChnVisas => "CD_CHNVISAS",
            PluginFeature::AztecCode => "CD_BARCODE_AZTECCODE",
            PluginFeature::UsVisas => "CD_USVISAS",
            PluginFeature::QrCode => "CD_BARCODE_QRCODE",
            PluginFeature::Code93 => "CD_BARCODE_1D_CODE_93",
            PluginFeature::Codabar => "CD_BARCODE_1D_CODABAR",
            PluginFeature::OcrToolkit => "CD_OCRTOOLKIT",
            PluginFeature::UpcEan => "CD_BARCODE_1D_UPC_EAN",
            PluginFeature::DataMatrix => "CD_BARCODE_DATAMATRIX",
            PluginFeature::Other(_) => return None,
        })
    }

    /// Barcode features carry a NUL-terminated string payload.
    pub fn is_barcode(self) -> bool {
        self.vendor_name()
            .is_some_and(|name| name.starts_with("CD_BARCODE"))
    }
}

/// Any data item tag: a fixed scalar tag or a plugin feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    Data(DataType),
    Plugin(PluginFeature),
}

impl Tag {
    /// Resolve an engine integer. Integers in the gap between the last scalar tag
    /// and `CD_PLUGIN` (or negative ones) are not tags.
    pub fn from_raw(raw: i32) -> Option<Self> {
        if raw >= CD_PLUGIN {
            Some(Tag::Plugin(PluginFeature::from_feature_id(raw - CD_PLUGIN)))
        } else {
            DataType::from_raw(raw).map(Tag::Data)
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            Tag::Data(t) => t.raw(),
            Tag::Plugin(feature) => CD_PLUGIN + feature.feature_id(),
        }
    }

    pub fn is_plugin(self) -> bool {
        matches!(self, Tag::Plugin(_))
    }

    pub fn shape(self) -> PayloadShape {
        match self {
            Tag::Data(t) => t.shape(),
            Tag::Plugin(_) => PayloadShape::Plugin,
        }
    }

    pub fn vendor_name(self) -> String {
        match self {
            Tag::Data(t) => t.vendor_name().to_string(),
            Tag::Plugin(feature) => match feature.vendor_name() {
                Some(name) => name.to_string(),
                None => format!("CD_PLUGIN+{}", feature.feature_id()),
            },
        }
    }
}

impl From<DataType> for Tag {
    fn from(t: DataType) -> Self {
        Tag::Data(t)
    }
}

impl From<PluginFeature> for Tag {
    fn from(feature: PluginFeature) -> Self {
        Tag::Plugin(feature)
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.vendor_name())
    }
}

/// Accepts a vendor name (`CD_IMAGEVIS`), `CD_PLUGIN+<id>`, or a bare integer.
impl FromStr for Tag {
    type Err = ReaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(t) = DataType::from_vendor_name(s) {
            return Ok(Tag::Data(t));
        }
        if let Some(feature) = PluginFeature::KNOWN
            .iter()
            .copied()
            .find(|f| f.vendor_name() == Some(s))
        {
            return Ok(Tag::Plugin(feature));
        }
        if let Some(offset) = s.strip_prefix("CD_PLUGIN+") {
            let id: i32 = offset
                .parse()
                .map_err(|_| ReaderError::UnknownTag(s.to_string()))?;
            return Ok(Tag::Plugin(PluginFeature::from_feature_id(id)));
        }
        s.parse::<i32>()
            .ok()
            .and_then(Tag::from_raw)
            .ok_or_else(|| ReaderError::UnknownTag(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_tags_are_contiguous_from_zero() {
        assert_eq!(DataType::ALL.len() as i32, NUM_MMMR_DATATYPES);
        for (i, t) in DataType::ALL.iter().enumerate() {
            assert_eq!(t.raw(), i as i32, "{t} out of order");
            assert_eq!(DataType::from_raw(i as i32), Some(*t));
        }
        assert_eq!(DataType::from_raw(NUM_MMMR_DATATYPES), None);
    }

    #[test]
    fn anchor_values_match_vendor() {
        assert_eq!(DataType::Codeline.raw(), 0);
        assert_eq!(DataType::BacKeyCorrection.raw(), 62);
        assert_eq!(DataType::DgcDocSignerCertValidate.raw(), 210);
        assert_eq!(Tag::Plugin(PluginFeature::QrCode).raw(), CD_PLUGIN + 12);
        assert_eq!(Tag::Plugin(PluginFeature::DataMatrix).raw(), 0x1000_0014);
    }

    #[test]
    fn plugin_range_never_collides_with_scalar_tags() {
        assert!(NUM_MMMR_DATATYPES < CD_PLUGIN);
        for t in DataType::ALL {
            assert!(!Tag::from_raw(t.raw()).is_some_and(Tag::is_plugin));
        }
        for feature in PluginFeature::KNOWN {
            let raw = Tag::Plugin(*feature).raw();
            assert!(raw >= CD_PLUGIN);
            assert_eq!(Tag::from_raw(raw), Some(Tag::Plugin(*feature)));
        }
        assert_eq!(
            Tag::from_raw(CD_PLUGIN + 99),
            Some(Tag::Plugin(PluginFeature::Other(99)))
        );
    }

    #[test]
    fn gap_between_namespaces_is_not_a_tag() {
        assert_eq!(Tag::from_raw(NUM_MMMR_DATATYPES + 1), None);
        assert_eq!(Tag::from_raw(-1), None);
    }

    #[test]
    fn retired_aliases_resolve_to_coax_images() {
        assert_eq!(DataType::CD_IMAGERESERVED1, DataType::ImageCoaxVis);
        assert_eq!(
            DataType::from_vendor_name("CD_IMAGERESERVED2"),
            Some(DataType::ImageCoaxIr)
        );
    }

    #[test]
    fn tags_parse_from_names_and_numbers() {
        assert_eq!("CD_IMAGEVIS".parse::<Tag>().ok(), Some(Tag::Data(DataType::ImageVis)));
        assert_eq!(
            "CD_BARCODE_PDF417".parse::<Tag>().ok(),
            Some(Tag::Plugin(PluginFeature::Pdf417))
        );
        assert_eq!(
            "CD_PLUGIN+31".parse::<Tag>().ok(),
            Some(Tag::Plugin(PluginFeature::Other(31)))
        );
        assert_eq!("2".parse::<Tag>().ok(), Some(Tag::Data(DataType::Checksum)));
        assert!("CD_NOT_A_TAG".parse::<Tag>().is_err());
    }

    #[test]
    fn shapes_follow_documented_payloads() {
        assert_eq!(DataType::Codeline.shape(), PayloadShape::Codeline);
        assert_eq!(DataType::ReadProgress.shape(), PayloadShape::Float32);
        assert_eq!(DataType::ScBacStatus.shape(), PayloadShape::TriState);
        assert_eq!(DataType::ScDg7Validate.shape(), PayloadShape::Validation);
        assert_eq!(DataType::ScDg2Photo.shape(), PayloadShape::Image);
        assert_eq!(DataType::BacKeyCorrection.shape(), PayloadShape::WritableText);
        assert_eq!(
            DataType::SwipeMsrData.shape(),
            PayloadShape::Struct("MMMReaderMsrData")
        );
        assert_eq!(DataType::Codeline.shape().max_len(), Some(201));
    }

    #[test]
    fn rfid_items_are_flagged() {
        assert!(DataType::ScDg1Codeline.is_rfid());
        assert!(DataType::PassiveAuthentication.is_rfid());
        assert!(!DataType::Codeline.is_rfid());
        assert!(!DataType::ImageVis.is_rfid());
    }
}
